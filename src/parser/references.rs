//! Reference extraction.
//!
//! Each line of the comment- and literal-masked file text is scanned for table
//! usages, `alias.column` usages and bare column names. Bare names are resolved
//! against the enclosing statement's candidate tables; a name owned by more than
//! one candidate yields one provisional reference per owner plus an
//! [`AmbiguousReference`] for the structured-parse pass to settle.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::definitions::IDENT;
use super::identifier_utils::{is_delimited, is_local_table_name, qualified_part_spans};
use super::keywords::{is_sql_keyword, is_type_keyword};
use super::scope::FileScopes;
use super::text::{blank_comments_and_strings, LineIndex};
use crate::model::{AliasMap, AliasTarget, CandidateTableSet, NormalizedName, ReferenceDef, ReferenceKind};

static TABLE_KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN|UPDATE|INTO|USING|DELETE)\b").unwrap());

static OBJECT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s+({IDENT}(?:\s*\.\s*{IDENT}){{0,3}})")).unwrap()
});

static EXEC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bEXEC(?:UTE)?\s+(?:@[\p{{L}}\p{{N}}_@#$]+\s*=\s*)?({IDENT}(?:\s*\.\s*{IDENT}){{0,2}})"
    ))
    .unwrap()
});

static QUALIFIED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{IDENT}(?:\s*\.\s*{IDENT}){{1,3}}")).unwrap());

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(IDENT).unwrap());

static TRAILING_AS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAS\s*$").unwrap());

/// Text before a word that puts it in type position (`@d DATE`, `CONVERT(DATE, ...)`, `PRIMARY KEY`).
static TYPE_POSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:@\w+|\bRETURNS|\bPRIMARY|\bFOREIGN|\b(?:TRY_)?CONVERT\s*\()\s*$").unwrap()
});

/// Column lookups against the global catalog.
pub trait ColumnCatalog {
    fn table_has_column(&self, table: &str, column: &str) -> bool;
}

/// A bare column owned by more than one candidate table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousReference {
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
    pub column: NormalizedName,
    /// Tables that received a provisional `table.column` reference at this position
    pub provisional: Vec<NormalizedName>,
    /// Every table in scope for the statement when the ambiguity was found
    pub candidates: CandidateTableSet,
    pub aliases: AliasMap,
    pub statement_text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedReferences {
    pub references: Vec<ReferenceDef>,
    pub ambiguities: Vec<AmbiguousReference>,
    /// The per-file reference cap was hit and extraction stopped early
    pub truncated: bool,
}

struct ReferenceSink<'a> {
    uri: &'a str,
    max: usize,
    seen: HashSet<ReferenceDef>,
    out: ExtractedReferences,
}

impl ReferenceSink<'_> {
    fn is_full(&self) -> bool {
        self.out.truncated
    }

    fn push(&mut self, name: NormalizedName, kind: ReferenceKind, (line, start_col, end_col): (u32, u32, u32)) {
        if self.out.truncated || name.is_empty() {
            return;
        }
        if self.out.references.len() >= self.max {
            self.out.truncated = true;
            return;
        }
        let reference = ReferenceDef {
            name,
            uri: self.uri.to_string(),
            line,
            start_col,
            end_col,
            kind,
        };
        if self.seen.insert(reference.clone()) {
            self.out.references.push(reference);
        }
    }
}

/// Extract every reference in a file, stopping after `max_references` references.
pub fn extract_references(
    uri: &str,
    text: &str,
    scopes: &FileScopes,
    catalog: &dyn ColumnCatalog,
    max_references: usize,
) -> ExtractedReferences {
    let masked = blank_comments_and_strings(text);
    let lines = LineIndex::new(text);
    let mut sink = ReferenceSink {
        uri,
        max: max_references,
        seen: HashSet::new(),
        out: ExtractedReferences::default(),
    };

    for line in 0..lines.line_count() {
        if sink.is_full() {
            break;
        }
        let Some(range) = lines.line_range(line) else {
            continue;
        };
        let mut claimed: Vec<Range<usize>> = Vec::new();
        table_usages(&masked, text, &lines, range.clone(), scopes, &mut claimed, &mut sink);
        routine_usages(&masked, text, &lines, range.clone(), &mut claimed, &mut sink);
        qualified_columns(&masked, text, &lines, range.clone(), scopes, &mut claimed, &mut sink);
        bare_columns(&masked, text, &lines, range, scopes, catalog, &claimed, &mut sink);
    }

    for routine in scopes.routines() {
        for parameter in routine.parameters.iter().chain(&routine.parameter_usages) {
            sink.push(parameter.name.clone(), ReferenceKind::Parameter, lines.span(&parameter.range));
        }
    }

    if sink.out.truncated {
        warn!(
            uri,
            limit = max_references,
            "Reference limit reached, remaining references in file were skipped"
        );
        // Ambiguities past the cap have no provisional references to correct
        let kept: HashSet<(u32, u32, u32)> = sink
            .out
            .references
            .iter()
            .map(|r| (r.line, r.start_col, r.end_col))
            .collect();
        sink.out
            .ambiguities
            .retain(|a| kept.contains(&(a.line, a.start_col, a.end_col)));
    }
    sink.out
}

fn overlaps(claimed: &[Range<usize>], range: &Range<usize>) -> bool {
    claimed
        .iter()
        .any(|c| c.start < range.end && range.start < c.end)
}

fn next_non_space(masked: &str, at: usize) -> Option<u8> {
    masked.as_bytes()[at..]
        .iter()
        .copied()
        .find(|b| *b != b' ' && *b != b'\t')
}

fn prev_non_space(masked: &str, at: usize) -> Option<u8> {
    masked.as_bytes()[..at]
        .iter()
        .rev()
        .copied()
        .find(|b| *b != b' ' && *b != b'\t')
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'@' | b'#' | b'$') || byte >= 0x80
}

/// Absolute byte range of the last part of a qualified name match.
fn last_part(raw: &str, start: usize) -> Option<Range<usize>> {
    qualified_part_spans(raw)
        .pop()
        .filter(|span| !span.is_empty())
        .map(|span| start + span.start..start + span.end)
}

/// `FROM|JOIN|UPDATE|INTO|USING|DELETE <name>` table references.
fn table_usages(
    masked: &str,
    text: &str,
    lines: &LineIndex<'_>,
    line: Range<usize>,
    scopes: &FileScopes,
    claimed: &mut Vec<Range<usize>>,
    sink: &mut ReferenceSink<'_>,
) {
    for keyword in TABLE_KEYWORD_RE.find_iter(&masked[line.clone()]) {
        let after = line.start + keyword.end();
        let Some(m) = OBJECT_NAME_RE
            .captures(&masked[after..line.end])
            .and_then(|caps| caps.get(1))
        else {
            continue;
        };
        let range = after + m.start()..after + m.end();
        let raw = &text[range.clone()];
        if !is_delimited(raw) && is_sql_keyword(raw) {
            continue;
        }
        if next_non_space(masked, range.end) == Some(b'(') {
            // Table-valued function call
            claimed.push(range);
            continue;
        }
        claimed.push(range.clone());

        let name = NormalizedName::new(raw);
        if is_local_table_name(name.as_str()) {
            continue;
        }
        if let Some(scope) = scopes.scope_at(range.start) {
            match scope.aliases.get(name.as_str()) {
                Some(AliasTarget::Subquery) => continue,
                // `UPDATE e SET ...` names an alias, not a table
                Some(AliasTarget::Table(table)) if table.unqualified() != name.unqualified() => continue,
                _ => {}
            }
        }
        if let Some(span) = last_part(raw, range.start) {
            sink.push(name, ReferenceKind::Table, lines.span(&span));
        }
    }
}

/// `EXEC[UTE] [@rc =] <procedure>` routine references.
fn routine_usages(
    masked: &str,
    text: &str,
    lines: &LineIndex<'_>,
    line: Range<usize>,
    claimed: &mut Vec<Range<usize>>,
    sink: &mut ReferenceSink<'_>,
) {
    for caps in EXEC_RE.captures_iter(&masked[line.clone()]) {
        let Some(m) = caps.get(1) else { continue };
        let range = line.start + m.start()..line.start + m.end();
        let raw = &text[range.clone()];
        claimed.push(range.clone());
        if raw.starts_with('@') || (!is_delimited(raw) && is_sql_keyword(raw)) {
            continue;
        }
        if let Some(span) = last_part(raw, range.start) {
            sink.push(NormalizedName::new(raw), ReferenceKind::Routine, lines.span(&span));
        }
    }
}

/// `alias.column` and `schema.table.column` references.
fn qualified_columns(
    masked: &str,
    text: &str,
    lines: &LineIndex<'_>,
    line: Range<usize>,
    scopes: &FileScopes,
    claimed: &mut Vec<Range<usize>>,
    sink: &mut ReferenceSink<'_>,
) {
    let bytes = masked.as_bytes();
    for m in QUALIFIED_RE.find_iter(&masked[line.clone()]) {
        let range = line.start + m.start()..line.start + m.end();
        if overlaps(claimed, &range) {
            continue;
        }
        if range.start > 0 && (is_word_byte(bytes[range.start - 1]) || bytes[range.start - 1] == b'.') {
            continue;
        }
        claimed.push(range.clone());
        // Function calls (`dbo.fn(...)`) and sequences are not columns
        if next_non_space(masked, range.end) == Some(b'(') {
            continue;
        }

        let raw = &text[range.clone()];
        let spans = qualified_part_spans(raw);
        let parts: Vec<&str> = spans.iter().map(|s| &raw[s.clone()]).collect();
        let (qualifier, column_span) = match parts.as_slice() {
            [qualifier, _] => (qualifier.to_string(), spans[1].clone()),
            [schema, table, _] => (format!("{schema}.{table}"), spans[2].clone()),
            _ => continue,
        };
        if qualifier.starts_with('@') || qualifier.starts_with('#') {
            continue;
        }

        let key = NormalizedName::new(&qualifier);
        let target = scopes.scope_at(range.start)
            .and_then(|scope| scope.aliases.get(key.as_str()))
            .or_else(|| scopes.file_aliases().get(key.as_str()));
        let table = match target {
            Some(AliasTarget::Table(table)) => table.clone(),
            Some(AliasTarget::Subquery) => continue,
            // Unbound three-part names are `schema.table.column`
            None if parts.len() == 3 => key,
            None => continue,
        };
        if is_local_table_name(table.as_str()) {
            continue;
        }

        let column = NormalizedName::new(parts[parts.len() - 1]);
        let span = range.start + column_span.start..range.start + column_span.end;
        sink.push(
            NormalizedName::qualified(&table, &column),
            ReferenceKind::Column,
            lines.span(&span),
        );
    }
}

/// Bare column names, resolved through the statement's candidate tables.
#[allow(clippy::too_many_arguments)]
fn bare_columns(
    masked: &str,
    text: &str,
    lines: &LineIndex<'_>,
    line: Range<usize>,
    scopes: &FileScopes,
    catalog: &dyn ColumnCatalog,
    claimed: &[Range<usize>],
    sink: &mut ReferenceSink<'_>,
) {
    let bytes = masked.as_bytes();
    for m in WORD_RE.find_iter(&masked[line.clone()]) {
        let range = line.start + m.start()..line.start + m.end();
        let word = m.as_str();
        if word.starts_with('@') || word.starts_with('#') || word.starts_with('$') {
            continue;
        }
        if !is_delimited(word) && is_sql_keyword(word) {
            continue;
        }
        if overlaps(claimed, &range) {
            continue;
        }
        if range.start > 0 && matches!(bytes[range.start - 1], b'.' | b'@' | b'#' | b'$') {
            continue;
        }
        if matches!(prev_non_space(masked, range.start), Some(b'.')) {
            continue;
        }
        if matches!(next_non_space(masked, range.end), Some(b'.' | b'(' | b'\'')) {
            continue;
        }
        if TRAILING_AS_RE.is_match(&masked[line.start..range.start]) {
            continue;
        }
        if !is_delimited(word)
            && (is_type_keyword(word) || word.eq_ignore_ascii_case("KEY"))
            && TYPE_POSITION_RE.is_match(&masked[line.start..range.start])
        {
            continue;
        }

        let Some(scope) = scopes.scope_at(range.start) else {
            continue;
        };
        let column = NormalizedName::new(&text[range.clone()]);
        if column.is_empty() || scope.aliases.is_explicit_alias(column.as_str()) {
            continue;
        }

        let owners: Vec<&NormalizedName> = scope
            .candidate_tables
            .iter()
            .filter(|table| {
                if is_local_table_name(table.as_str()) {
                    scope.local_tables.has_column(table.as_str(), column.as_str())
                } else {
                    catalog.table_has_column(table.as_str(), column.as_str())
                }
            })
            .collect();
        let global: Vec<&NormalizedName> = owners
            .iter()
            .copied()
            .filter(|table| !is_local_table_name(table.as_str()))
            .collect();

        let inner = qualified_part_spans(&text[range.clone()])
            .pop()
            .map(|s| range.start + s.start..range.start + s.end)
            .unwrap_or(range.clone());
        let span = lines.span(&inner);
        for table in &global {
            sink.push(NormalizedName::qualified(table, &column), ReferenceKind::Column, span);
        }

        if owners.len() > 1 && !global.is_empty() && !sink.is_full() {
            let (line_no, start_col, end_col) = span;
            sink.out.ambiguities.push(AmbiguousReference {
                line: line_no,
                start_col,
                end_col,
                column,
                provisional: global.into_iter().cloned().collect(),
                candidates: scope.candidate_tables.clone(),
                aliases: scope.aliases.clone(),
                statement_text: scope.text(text).to_string(),
            });
        }
    }
}
