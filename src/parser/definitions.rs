//! Definition extraction: `CREATE {TABLE|VIEW|PROCEDURE|FUNCTION|TYPE}` blocks.
//!
//! Works on comment- and literal-masked text with a handful of regexes and the
//! balanced-paren block scanner; no grammar is involved, so malformed input
//! yields partial results instead of errors.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::identifier_utils::{display_name, is_delimited, qualified_part_spans};
use super::keywords::{is_constraint_keyword, is_sql_keyword};
use super::text::{
    blank_comments_and_strings, find_top_level_keyword, paren_block, split_top_level, LineIndex,
};
use crate::model::{ColumnDef, NormalizedName, SymbolDef, SymbolKind};

/// One identifier: bracketed, double-quoted or bare (T-SQL allows `@#$` inside names).
pub(crate) const IDENT: &str = r#"(?:\[[^\]\n]*\]|"[^"\n]*"|[\p{L}_@#$][\p{L}\p{N}_@#$]*)"#;

static CREATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bCREATE\s+(?:OR\s+ALTER\s+)?(PROCEDURE|PROC|FUNCTION|VIEW|TABLE|TYPE)\s+({IDENT}(?:\s*\.\s*{IDENT}){{0,2}})"
    ))
    .unwrap()
});

static GO_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*GO(?:[ \t]+\d+)?[ \t]*\r?$").unwrap());

static AS_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*AS\s+TABLE\b").unwrap());

static LEADING_IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^{IDENT}")).unwrap());

static TYPE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([^\s,()]+)").unwrap());

static EQ_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^({IDENT})\s*=(?:[^=]|$)")).unwrap());

static AS_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\bAS\s+({IDENT})\s*$")).unwrap());

static TRAILING_IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"({IDENT})\s*$")).unwrap());

static PROJECTION_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\s*(?:DISTINCT|ALL)\b)?(?:\s*TOP\s*(?:\(\s*[^)]*\)|\d+)(?:\s+PERCENT)?(?:\s+WITH\s+TIES)?)?\s*")
        .unwrap()
});

/// Extract every definition in a file.
///
/// Temp tables (`CREATE TABLE #t`) and scalar alias types are not catalog objects and are skipped.
pub fn extract_definitions(uri: &str, text: &str) -> Vec<SymbolDef> {
    let masked = blank_comments_and_strings(text);
    let lines = LineIndex::new(text);
    let boundaries = definition_boundaries(&masked);
    let mut symbols = Vec::new();

    for caps in CREATE_RE.captures_iter(&masked) {
        let (Some(whole), Some(kind_match), Some(name_match)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let raw = &text[name_match.range()];
        let name = NormalizedName::new(raw);
        if name.is_empty() || name.as_str().starts_with('#') {
            continue;
        }

        let statement_end = boundaries
            .iter()
            .copied()
            .find(|&b| b > whole.start())
            .unwrap_or(masked.len());
        let body = name_match.end()..statement_end;

        let kind_word = kind_match.as_str().to_ascii_uppercase();
        let (kind, columns) = match kind_word.as_str() {
            "PROCEDURE" | "PROC" => (SymbolKind::Procedure, Vec::new()),
            "FUNCTION" => (SymbolKind::Function, Vec::new()),
            "TABLE" => (SymbolKind::Table, table_columns(&masked, text, &lines, body.start)),
            "VIEW" => (SymbolKind::View, view_columns(&masked, text, &lines, body)),
            _ => match AS_TABLE_RE.find(&masked[body.start..]) {
                Some(as_table) => (
                    SymbolKind::TableType,
                    table_columns(&masked, text, &lines, body.start + as_table.end()),
                ),
                None => continue,
            },
        };

        let name_span = qualified_part_spans(raw)
            .last()
            .map(|span| name_match.start() + span.start..name_match.start() + span.end)
            .unwrap_or(name_match.range());
        let (line, start_col, end_col) = lines.span(&name_span);

        symbols.push(SymbolDef {
            name,
            raw_name: display_name(raw),
            uri: uri.to_string(),
            line,
            start_col,
            end_col,
            kind,
            columns,
        });
    }

    symbols
}

/// Offsets where a definition's statement text ends: every `CREATE` header and `GO` separator.
fn definition_boundaries(masked: &str) -> Vec<usize> {
    let mut boundaries: Vec<usize> = CREATE_RE
        .find_iter(masked)
        .map(|m| m.start())
        .chain(GO_LINE_RE.find_iter(masked).map(|m| m.start()))
        .collect();
    boundaries.sort_unstable();
    boundaries
}

fn skip_whitespace(masked: &str, mut at: usize) -> usize {
    let bytes = masked.as_bytes();
    while at < bytes.len() && bytes[at].is_ascii_whitespace() {
        at += 1;
    }
    at
}

/// Columns of a `CREATE TABLE`/`CREATE TYPE AS TABLE` body starting at the `(` after `from`.
fn table_columns(masked: &str, text: &str, lines: &LineIndex<'_>, from: usize) -> Vec<ColumnDef> {
    let open = skip_whitespace(masked, from);
    let Some(block) = paren_block(masked, open) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    block
        .rows
        .iter()
        .filter_map(|row| column_from_row(masked, text, lines, row))
        .filter(|column| seen.insert(column.name.clone()))
        .collect()
}

/// A table row's column: the leading identifier plus the token after it as a type.
fn column_from_row(
    masked: &str,
    text: &str,
    lines: &LineIndex<'_>,
    row: &Range<usize>,
) -> Option<ColumnDef> {
    let row_text = &masked[row.clone()];
    let ident = LEADING_IDENT_RE.find(row_text)?;
    let ident_text = ident.as_str();
    if !is_delimited(ident_text) && is_constraint_keyword(ident_text) {
        return None;
    }

    let name_range = row.start + ident.start()..row.start + ident.end();
    let data_type = TYPE_TOKEN_RE
        .captures(&row_text[ident.end()..])
        .and_then(|caps| caps.get(1))
        .map(|m| super::normalize_identifier(m.as_str()))
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("AS"));

    column_def(text, lines, name_range, data_type)
}

fn column_def(
    text: &str,
    lines: &LineIndex<'_>,
    ident_range: Range<usize>,
    data_type: Option<String>,
) -> Option<ColumnDef> {
    let raw = &text[ident_range.clone()];
    let inner = qualified_part_spans(raw).pop()?;
    let raw_name = raw[inner.clone()].to_string();
    let name = NormalizedName::new(&raw_name);
    if name.is_empty() {
        return None;
    }
    let span = ident_range.start + inner.start..ident_range.start + inner.end;
    let (line, start_col, end_col) = lines.span(&span);
    Some(ColumnDef {
        name,
        raw_name,
        data_type,
        line,
        start_col,
        end_col,
    })
}

/// View columns: an explicit `(a, b)` list wins, otherwise the projection of the first
/// top-level `SELECT`.
fn view_columns(
    masked: &str,
    text: &str,
    lines: &LineIndex<'_>,
    body: Range<usize>,
) -> Vec<ColumnDef> {
    let mut seen = HashSet::new();
    let mut keep = |column: ColumnDef| seen.insert(column.name.clone()).then_some(column);

    let after_name = skip_whitespace(masked, body.start);
    if let Some(list) = paren_block(masked, after_name) {
        return list
            .rows
            .iter()
            .filter_map(|row| {
                let ident = LEADING_IDENT_RE.find(&masked[row.clone()])?;
                column_def(text, lines, row.start + ident.start()..row.start + ident.end(), None)
            })
            .filter_map(&mut keep)
            .collect();
    }

    let Some(as_at) = find_top_level_keyword(masked, body.clone(), "AS") else {
        return Vec::new();
    };
    let Some(select_at) = find_top_level_keyword(masked, as_at + 2..body.end, "SELECT") else {
        return Vec::new();
    };
    let projection_start = select_at + "SELECT".len();
    let projection_end =
        find_top_level_keyword(masked, projection_start..body.end, "FROM").unwrap_or(body.end);

    let mut items = split_top_level(masked, projection_start..projection_end);
    if let Some(first) = items.first_mut() {
        if let Some(prefix) = PROJECTION_PREFIX_RE.find(&masked[first.clone()]) {
            first.start += prefix.end();
        }
    }

    items
        .iter()
        .filter_map(|item| projected_column(masked, item))
        .filter_map(|ident| column_def(text, lines, ident, None))
        .filter_map(&mut keep)
        .collect()
}

/// Byte range of the identifier naming one projection item's output column.
fn projected_column(masked: &str, item: &Range<usize>) -> Option<Range<usize>> {
    let item_text = &masked[item.clone()];
    let at = |m: regex::Match<'_>| item.start + m.start()..item.start + m.end();

    let ident = if let Some(alias) = EQ_ALIAS_RE.captures(item_text).and_then(|c| c.get(1)) {
        alias
    } else if let Some(alias) = AS_ALIAS_RE.captures(item_text).and_then(|c| c.get(1)) {
        alias
    } else {
        // A trailing identifier is either the column itself (`Name`, `e.Name`)
        // or an implicit alias after an expression (`COUNT(*) Total`).
        TRAILING_IDENT_RE.captures(item_text).and_then(|c| c.get(1))?
    };

    if !is_delimited(ident.as_str()) && is_sql_keyword(ident.as_str()) {
        return None;
    }
    if ident.as_str().starts_with('@') {
        return None;
    }
    Some(at(ident))
}
