//! Statement scope resolution.
//!
//! A file is tokenized once with the MS SQL tokenizer, split into statements
//! (`;`, `GO`, and top-level statement keywords), and each statement gets an
//! alias map and a candidate table set. Routine bodies additionally collect
//! the temp tables and table variables they declare.

use std::collections::HashSet;
use std::ops::Range;

use sqlparser::dialect::MsSqlDialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer, Word};
use tracing::debug;

use super::identifier_utils::is_local_table_name;
use super::keywords::{
    is_alias_stop_keyword, is_constraint_keyword, is_sql_keyword, is_statement_start_keyword,
};
use super::text::{split_on_semicolons, LineIndex};
use crate::model::{AliasMap, AliasTarget, CandidateTableSet, LocalTableMap, NormalizedName};

/// A significant token (no whitespace or comments) with absolute byte offsets.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tok {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

impl Tok {
    fn word(&self) -> Option<&Word> {
        match &self.token {
            Token::Word(w) => Some(w),
            _ => None,
        }
    }

    /// Identifier text, quoted or not.
    pub fn ident(&self) -> Option<&str> {
        self.word().map(|w| w.value.as_str())
    }

    /// Word text when the word is not delimited.
    pub fn bare_word(&self) -> Option<&str> {
        self.word()
            .filter(|w| w.quote_style.is_none())
            .map(|w| w.value.as_str())
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.bare_word()
            .is_some_and(|w| w.eq_ignore_ascii_case(keyword))
    }

    fn is_variable(&self) -> bool {
        self.bare_word()
            .is_some_and(|w| w.starts_with('@') && !w.starts_with("@@"))
    }
}

/// Tokenize `text`, shifting offsets by `base`. `None` when the tokenizer rejects the input.
pub(crate) fn tokenize_at(text: &str, base: usize) -> Option<Vec<Tok>> {
    let dialect = MsSqlDialect {};
    let tokens = Tokenizer::new(&dialect, text)
        .tokenize_with_location()
        .ok()?;
    let lines = LineIndex::new(text);
    let offset_of = |loc: Location| {
        lines.offset(
            (loc.line as usize).saturating_sub(1),
            (loc.column as usize).saturating_sub(1),
        )
    };

    Some(
        tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
            .map(|t| Tok {
                start: base + offset_of(t.span.start),
                end: base + offset_of(t.span.end),
                token: t.token,
            })
            .collect(),
    )
}

/// Scope data for the statement enclosing a position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementScope {
    /// Byte range of the statement text
    pub range: Range<usize>,
    pub aliases: AliasMap,
    pub candidate_tables: CandidateTableSet,
    /// Locals of the enclosing routine body, empty outside routines
    pub local_tables: LocalTableMap,
}

impl StatementScope {
    pub fn text<'t>(&self, source: &'t str) -> &'t str {
        source.get(self.range.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Procedure,
    Function,
    Trigger,
}

/// An `@name` token inside a routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterToken {
    pub name: NormalizedName,
    pub range: Range<usize>,
}

/// A `CREATE PROCEDURE|FUNCTION|TRIGGER` body, running to the next definition or `GO`.
#[derive(Debug, Clone)]
pub struct RoutineSpan {
    pub kind: RoutineKind,
    pub name: NormalizedName,
    pub range: Range<usize>,
    /// Parameters declared in the header
    pub parameters: Vec<ParameterToken>,
    /// Uses of declared parameters in the body
    pub parameter_usages: Vec<ParameterToken>,
    pub local_tables: LocalTableMap,
}

/// Every statement scope and routine body of one file.
#[derive(Debug, Clone, Default)]
pub struct FileScopes {
    statements: Vec<StatementScope>,
    routines: Vec<RoutineSpan>,
    file_aliases: AliasMap,
}

impl FileScopes {
    pub fn analyze(text: &str) -> Self {
        let (tokens, statement_tokens) = match tokenize_at(text, 0) {
            Some(tokens) => {
                let statements = split_statements(&tokens, text);
                (tokens, statements)
            }
            None => {
                debug!("Tokenizer rejected input, falling back to semicolon splitting");
                let mut tokens = Vec::new();
                let mut statements = Vec::new();
                for piece in split_on_semicolons(text) {
                    let Some(piece_tokens) = tokenize_at(&text[piece.clone()], piece.start) else {
                        continue;
                    };
                    let base = tokens.len();
                    statements.extend(
                        split_statements(&piece_tokens, text)
                            .into_iter()
                            .map(|r| base + r.start..base + r.end),
                    );
                    tokens.extend(piece_tokens);
                }
                (tokens, statements)
            }
        };

        let routines = find_routines(&tokens, text);
        let mut file_aliases = AliasMap::new();
        let statements: Vec<StatementScope> = statement_tokens
            .into_iter()
            .filter(|r| !r.is_empty())
            .map(|r| {
                let toks = &tokens[r];
                let range = toks[0].start..toks[toks.len() - 1].end;
                let (aliases, candidate_tables) = StatementScanner::new(toks).scan();
                file_aliases.extend_missing(&aliases);
                let local_tables = routines
                    .iter()
                    .find(|routine| routine.range.contains(&range.start))
                    .map(|routine| routine.local_tables.clone())
                    .unwrap_or_default();
                StatementScope {
                    range,
                    aliases,
                    candidate_tables,
                    local_tables,
                }
            })
            .collect();

        Self {
            statements,
            routines,
            file_aliases,
        }
    }

    /// Scope of the statement containing `offset`, if any.
    pub fn scope_at(&self, offset: usize) -> Option<&StatementScope> {
        let after = self
            .statements
            .partition_point(|scope| scope.range.start <= offset);
        let scope = self.statements.get(after.checked_sub(1)?)?;
        (offset <= scope.range.end).then_some(scope)
    }

    pub fn statements(&self) -> &[StatementScope] {
        &self.statements
    }

    pub fn routines(&self) -> &[RoutineSpan] {
        &self.routines
    }

    /// Union of all statement alias maps; the first binding of an alias wins.
    pub fn file_aliases(&self) -> &AliasMap {
        &self.file_aliases
    }
}

/// Resolve the scope of the statement around byte `offset` of `text`.
///
/// `text` may be a whole file or a single statement. Positions between
/// statements resolve to an empty scope.
pub fn resolve_statement_scope(text: &str, offset: usize) -> StatementScope {
    FileScopes::analyze(text)
        .scope_at(offset)
        .cloned()
        .unwrap_or_default()
}

fn starts_line(text: &str, offset: usize) -> bool {
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    text[line_start..offset].trim().is_empty()
}

fn is_go_separator(tok: &Tok, text: &str) -> bool {
    tok.is_keyword("GO") && starts_line(text, tok.start)
}

#[derive(Debug, Default)]
struct OpenStatement {
    start: Option<usize>,
    head: String,
    depth: usize,
    case_depth: usize,
    source_seen: bool,
    set_seen: bool,
    cte_pending: bool,
}

impl OpenStatement {
    fn begin(&mut self, index: usize, tok: &Tok) {
        *self = OpenStatement {
            start: Some(index),
            head: tok.bare_word().unwrap_or_default().to_ascii_uppercase(),
            depth: self.depth,
            ..OpenStatement::default()
        };
        self.cte_pending = self.head == "WITH";
    }
}

/// Split tokens into statements; returns token index ranges.
fn split_statements(tokens: &[Tok], text: &str) -> Vec<Range<usize>> {
    let mut statements = Vec::new();
    let mut open = OpenStatement::default();

    let close = |open: &mut OpenStatement, end: usize, out: &mut Vec<Range<usize>>| {
        if let Some(start) = open.start.take() {
            if end > start {
                out.push(start..end);
            }
        }
        *open = OpenStatement::default();
    };

    for (i, tok) in tokens.iter().enumerate() {
        if open.depth == 0 && (tok.token == Token::SemiColon || is_go_separator(tok, text)) {
            close(&mut open, i, &mut statements);
            continue;
        }

        let depth_before = open.depth;
        match tok.token {
            Token::LParen => open.depth += 1,
            Token::RParen => open.depth = open.depth.saturating_sub(1),
            _ => {}
        }

        if open.start.is_none() {
            open.begin(i, tok);
            continue;
        }
        if depth_before > 0 {
            continue;
        }
        let Some(word) = tok.bare_word() else {
            continue;
        };
        let upper = word.to_ascii_uppercase();
        if upper == "CASE" {
            open.case_depth += 1;
            continue;
        }
        if upper == "END" && open.case_depth > 0 {
            open.case_depth -= 1;
            continue;
        }
        if starts_new_statement(tokens, i, &upper, &mut open) {
            close(&mut open, i, &mut statements);
            open.begin(i, tok);
        }
    }
    close(&mut open, tokens.len(), &mut statements);
    statements
}

/// Continuation rules: a statement keyword that belongs to the open statement does not split it.
fn starts_new_statement(tokens: &[Tok], i: usize, upper: &str, open: &mut OpenStatement) -> bool {
    if !is_statement_start_keyword(upper) {
        return false;
    }
    let prev = &tokens[i - 1];
    if matches!(prev.token, Token::Comma | Token::LParen) {
        return false;
    }
    if let Some(prev_word) = prev.bare_word() {
        let prev_upper = prev_word.to_ascii_uppercase();
        if matches!(
            prev_upper.as_str(),
            "UNION"
                | "ALL"
                | "EXCEPT"
                | "INTERSECT"
                | "FOR"
                | "AFTER"
                | "OF"
                | "ON"
                | "GRANT"
                | "DENY"
                | "REVOKE"
                | "WITH"
                | "INSTEAD"
        ) {
            return false;
        }
        if upper == "FETCH" && matches!(prev_upper.as_str(), "ROWS" | "ROW") {
            return false;
        }
        if upper == "SET" && matches!(prev_upper.as_str(), "DELETE" | "UPDATE") {
            return false;
        }
    }

    let next = tokens.get(i + 1);
    match upper {
        "WITH" if !is_cte_start(tokens, i) => return false,
        "UPDATE" if next.is_some_and(|t| t.token == Token::LParen) => return false,
        _ => {}
    }

    match open.head.as_str() {
        "UPDATE" if upper == "SET" && !open.set_seen => {
            open.set_seen = true;
            false
        }
        "INSERT" if matches!(upper, "SELECT" | "EXEC" | "EXECUTE" | "WITH") && !open.source_seen => {
            open.source_seen = true;
            false
        }
        "WITH"
            if open.cte_pending && matches!(upper, "SELECT" | "INSERT" | "UPDATE" | "DELETE" | "MERGE") =>
        {
            open.cte_pending = false;
            open.head = upper.to_string();
            false
        }
        "MERGE" if matches!(upper, "UPDATE" | "DELETE" | "INSERT" | "SET") => false,
        "ALTER" if matches!(upper, "ALTER" | "DROP") => false,
        _ => true,
    }
}

fn is_cte_start(tokens: &[Tok], i: usize) -> bool {
    let Some(name) = tokens.get(i + 1) else {
        return false;
    };
    let Some(word) = name.ident() else {
        return false;
    };
    if name.word().is_some_and(|w| w.quote_style.is_none())
        && matches!(
            word.to_ascii_uppercase().as_str(),
            "SCHEMABINDING"
                | "ENCRYPTION"
                | "RECOMPILE"
                | "VIEW_METADATA"
                | "NATIVE_COMPILATION"
                | "EXECUTE"
                | "EXEC"
                | "CHECK"
                | "NOCHECK"
                | "TIES"
                | "ROLLUP"
                | "CUBE"
        )
    {
        return false;
    }
    tokens
        .get(i + 2)
        .is_some_and(|t| t.is_keyword("AS") || t.token == Token::LParen)
}

/// Token-based parser for extracting table aliases and candidate tables from one statement.
struct StatementScanner<'a> {
    toks: &'a [Tok],
    pos: usize,
    aliases: AliasMap,
    candidates: CandidateTableSet,
    ctes: HashSet<String>,
    deferred_targets: Vec<String>,
}

impl<'a> StatementScanner<'a> {
    fn new(toks: &'a [Tok]) -> Self {
        Self {
            toks,
            pos: 0,
            aliases: AliasMap::new(),
            candidates: CandidateTableSet::new(),
            ctes: HashSet::new(),
            deferred_targets: Vec::new(),
        }
    }

    fn scan(mut self) -> (AliasMap, CandidateTableSet) {
        // First pass: CTE names, so later FROM items naming them bind to the sentinel
        if self.check_keyword("WITH") {
            self.collect_cte_names();
        }

        // Second pass: FROM/JOIN/APPLY/UPDATE/INSERT/DELETE/MERGE/USING and `) alias`
        self.pos = 0;
        while !self.is_at_end() {
            if self.check_keyword("FROM") {
                self.advance();
                self.table_factor_list();
            } else if self.check_keyword("JOIN") || self.check_keyword("APPLY") {
                self.advance();
                self.table_factor();
            } else if self.check_keyword("UPDATE") && !self.peek_is(1, &Token::LParen) {
                self.advance();
                self.skip_top();
                if let Some(target) = self.parse_object_name() {
                    self.deferred_targets.push(target);
                }
            } else if self.check_keyword("INSERT") {
                self.advance();
                self.skip_top();
                if self.check_keyword("INTO") {
                    self.advance();
                }
                if let Some(target) = self.parse_object_name() {
                    self.add_table(&target, None);
                }
            } else if self.check_keyword("DELETE") {
                self.advance();
                self.skip_top();
                if !self.check_keyword("FROM") {
                    if let Some(target) = self.parse_object_name() {
                        self.deferred_targets.push(target);
                    }
                }
            } else if self.check_keyword("MERGE") {
                self.advance();
                self.skip_top();
                if self.check_keyword("INTO") {
                    self.advance();
                }
                if let Some(target) = self.parse_object_name() {
                    self.skip_table_hints();
                    let alias = self.try_parse_alias();
                    self.add_table(&target, alias);
                }
            } else if self.check_keyword("USING") {
                self.advance();
                self.table_factor();
            } else if self.check_token(&Token::RParen) {
                // Subquery alias pattern: `) AS alias` or `) alias`
                self.advance();
                if let Some(alias) = self.try_parse_alias() {
                    self.aliases.bind_subquery(&alias);
                }
            } else if self.check_keyword("INTO") {
                // SELECT ... INTO / OUTPUT ... INTO targets are not row sources
                self.advance();
                let _ = self.parse_object_name();
            } else {
                self.advance();
            }
        }

        for target in std::mem::take(&mut self.deferred_targets) {
            match self.aliases.get(&target) {
                Some(AliasTarget::Table(table)) => {
                    self.candidates.insert(table.clone());
                }
                Some(AliasTarget::Subquery) => {}
                None => self.add_table(&target, None),
            }
        }

        (self.aliases, self.candidates)
    }

    fn collect_cte_names(&mut self) {
        self.pos = 1;
        loop {
            let Some(name) = self.current().and_then(Tok::ident).map(str::to_string) else {
                break;
            };
            self.advance();
            if self.check_token(&Token::LParen) {
                self.skip_balanced_parens();
            }
            if !self.check_keyword("AS") {
                break;
            }
            self.advance();
            if !self.check_token(&Token::LParen) {
                break;
            }
            self.ctes.insert(name.to_lowercase());
            self.aliases.bind_subquery(&name);
            self.skip_balanced_parens();
            if !self.check_token(&Token::Comma) {
                break;
            }
            self.advance();
        }
    }

    fn table_factor_list(&mut self) {
        loop {
            self.table_factor();
            if !self.check_token(&Token::Comma) {
                break;
            }
            self.advance();
        }
    }

    /// One FROM/JOIN item. Derived tables are left for the main loop, which scans
    /// their contents and picks the alias up at the closing paren.
    fn table_factor(&mut self) {
        if self.check_token(&Token::LParen) {
            return;
        }
        let Some(name) = self.parse_object_name() else {
            return;
        };

        // Table-valued function: dbo.f_split(@args, ',') [AS] alias
        if self.check_token(&Token::LParen) {
            self.skip_balanced_parens();
            if let Some(alias) = self.try_parse_alias() {
                self.aliases.bind_subquery(&alias);
            }
            return;
        }

        if self.ctes.contains(&name.to_lowercase()) {
            if let Some(alias) = self.try_parse_alias() {
                self.aliases.bind_subquery(&alias);
            }
            return;
        }

        self.skip_table_hints();
        let alias = self.try_parse_alias();
        self.skip_table_hints();
        self.add_table(&name, alias);
    }

    fn add_table(&mut self, raw: &str, alias: Option<String>) {
        let table = NormalizedName::new(raw);
        if table.is_empty() {
            return;
        }
        self.candidates.insert(table.clone());
        if let Some(alias) = alias {
            self.aliases.bind_table(&alias, table.clone());
        }
        // Always add the table name itself as a self-alias so `Employee.Name` resolves
        let own_name = table.unqualified().to_string();
        self.aliases.bind_table(&own_name, table);
    }

    /// Parse a possibly qualified object name; `None` when the first word is a keyword.
    fn parse_object_name(&mut self) -> Option<String> {
        let first = self.current()?;
        let first_word = first.word()?;
        if first_word.quote_style.is_none() && is_sql_keyword(&first_word.value) {
            return None;
        }
        let mut name = first_word.value.clone();
        self.advance();

        while self.check_token(&Token::Period) {
            self.advance();
            // `db..table` skips the schema
            while self.check_token(&Token::Period) {
                self.advance();
            }
            match self.current().and_then(Tok::ident) {
                Some(part) => {
                    name.push('.');
                    name.push_str(part);
                    self.advance();
                }
                None => break,
            }
        }
        Some(name)
    }

    /// Try to parse a table alias (identifier that's not a reserved keyword for clause structure)
    fn try_parse_alias(&mut self) -> Option<String> {
        let saved = self.pos;
        if self.check_keyword("AS") {
            self.advance();
        }
        let candidate = self.current().and_then(|tok| {
            let word = tok.word()?;
            if word.quote_style.is_some() {
                return Some(word.value.clone());
            }
            let value = &word.value;
            let usable = !value.starts_with('@')
                && !is_alias_stop_keyword(value)
                && !is_statement_start_keyword(value);
            usable.then(|| value.clone())
        });
        match candidate {
            Some(alias) => {
                self.advance();
                Some(alias)
            }
            None => {
                self.pos = saved;
                None
            }
        }
    }

    /// Skip `WITH (NOLOCK, ...)` table hints.
    fn skip_table_hints(&mut self) {
        if self.check_keyword("WITH") && self.peek_is(1, &Token::LParen) {
            self.advance();
            self.skip_balanced_parens();
        }
    }

    /// Skip `TOP (n) [PERCENT]` after UPDATE/INSERT/DELETE/MERGE.
    fn skip_top(&mut self) {
        if !self.check_keyword("TOP") {
            return;
        }
        self.advance();
        if self.check_token(&Token::LParen) {
            self.skip_balanced_parens();
        } else {
            self.advance();
        }
        if self.check_keyword("PERCENT") {
            self.advance();
        }
    }

    fn skip_balanced_parens(&mut self) {
        if !self.check_token(&Token::LParen) {
            return;
        }
        let mut depth = 0usize;
        while !self.is_at_end() {
            if self.check_token(&Token::LParen) {
                depth += 1;
            } else if self.check_token(&Token::RParen) {
                depth -= 1;
                if depth == 0 {
                    self.advance();
                    return;
                }
            }
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn current(&self) -> Option<&'a Tok> {
        self.toks.get(self.pos)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.current().is_some_and(|t| t.is_keyword(keyword))
    }

    fn check_token(&self, expected: &Token) -> bool {
        self.current().is_some_and(|t| &t.token == expected)
    }

    fn peek_is(&self, ahead: usize, expected: &Token) -> bool {
        self.toks
            .get(self.pos + ahead)
            .is_some_and(|t| &t.token == expected)
    }
}

/// Routine bodies end at the next definition header or `GO`.
fn find_routines(tokens: &[Tok], text: &str) -> Vec<RoutineSpan> {
    let mut boundaries = Vec::new();
    let mut starts = Vec::new();

    for (i, tok) in tokens.iter().enumerate() {
        if is_go_separator(tok, text) {
            boundaries.push(i);
            continue;
        }
        if !tok.is_keyword("CREATE") {
            continue;
        }
        let mut j = i + 1;
        if tokens.get(j).is_some_and(|t| t.is_keyword("OR"))
            && tokens.get(j + 1).is_some_and(|t| t.is_keyword("ALTER"))
        {
            j += 2;
        }
        let Some(kind_tok) = tokens.get(j) else {
            continue;
        };
        let kind = match kind_tok.bare_word().map(str::to_ascii_uppercase).as_deref() {
            Some("PROCEDURE" | "PROC") => Some(RoutineKind::Procedure),
            Some("FUNCTION") => Some(RoutineKind::Function),
            Some("TRIGGER") => Some(RoutineKind::Trigger),
            Some("VIEW" | "TYPE") => None,
            Some("TABLE") => {
                let temp = tokens
                    .get(j + 1)
                    .and_then(Tok::ident)
                    .is_some_and(is_local_table_name);
                if temp {
                    continue;
                }
                None
            }
            _ => continue,
        };
        boundaries.push(i);
        if let Some(kind) = kind {
            starts.push((i, j + 1, kind));
        }
    }

    starts
        .into_iter()
        .map(|(start, name_at, kind)| {
            let end = boundaries
                .iter()
                .copied()
                .find(|&b| b > start)
                .unwrap_or(tokens.len());
            build_routine(tokens, start..end, name_at, kind)
        })
        .collect()
}

fn build_routine(tokens: &[Tok], span: Range<usize>, name_at: usize, kind: RoutineKind) -> RoutineSpan {
    let mut name_parts = Vec::new();
    let mut k = name_at;
    while let Some(part) = tokens.get(k).filter(|_| k < span.end).and_then(Tok::ident) {
        name_parts.push(part.to_string());
        k += 1;
        if tokens.get(k).is_some_and(|t| t.token == Token::Period) {
            k += 1;
        } else {
            break;
        }
    }
    let name = NormalizedName::new(&name_parts.join("."));

    // Header runs to the first top-level AS (not `@p AS type`) or RETURNS
    let mut parameters = Vec::new();
    let mut depth = 0usize;
    let mut header_end = span.end;
    for idx in k..span.end {
        let tok = &tokens[idx];
        match tok.token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0 {
            let after_param = idx > 0 && tokens[idx - 1].is_variable();
            if (tok.is_keyword("AS") && !after_param) || tok.is_keyword("RETURNS") {
                header_end = idx;
                break;
            }
        }
        if tok.is_variable() && depth <= 1 {
            parameters.push(ParameterToken {
                name: NormalizedName::new(tok.ident().unwrap_or_default()),
                range: tok.start..tok.end,
            });
        }
    }

    let declared: HashSet<&NormalizedName> = parameters.iter().map(|p| &p.name).collect();
    let parameter_usages = tokens[header_end..span.end]
        .iter()
        .filter(|tok| tok.is_variable())
        .filter_map(|tok| {
            let name = NormalizedName::new(tok.ident().unwrap_or_default());
            declared.contains(&name).then(|| ParameterToken {
                name,
                range: tok.start..tok.end,
            })
        })
        .collect();

    let body = &tokens[span.clone()];
    let range = body.first().map(|t| t.start).unwrap_or_default()
        ..body.last().map(|t| t.end).unwrap_or_default();

    RoutineSpan {
        kind,
        name,
        range,
        parameters,
        parameter_usages,
        local_tables: routine_local_tables(body),
    }
}

/// Temp tables and table variables declared or populated inside a routine body.
fn routine_local_tables(toks: &[Tok]) -> LocalTableMap {
    let mut locals = LocalTableMap::new();
    let word_at = |i: usize| toks.get(i).and_then(Tok::ident);
    let keyword_at = |i: usize, kw: &str| toks.get(i).is_some_and(|t| t.is_keyword(kw));
    let paren_at = |i: usize| toks.get(i).is_some_and(|t| t.token == Token::LParen);

    for (i, tok) in toks.iter().enumerate() {
        if tok.is_keyword("DECLARE") {
            // DECLARE @v [AS] TABLE (...)
            let Some(name) = word_at(i + 1).filter(|n| n.starts_with('@')) else {
                continue;
            };
            let mut j = i + 2;
            if keyword_at(j, "AS") {
                j += 1;
            }
            if keyword_at(j, "TABLE") && paren_at(j + 1) {
                locals.add_columns(NormalizedName::new(name), column_rows(toks, j + 1));
            }
        } else if tok.is_keyword("CREATE") && keyword_at(i + 1, "TABLE") {
            let Some(name) = word_at(i + 2).filter(|n| n.starts_with('#')) else {
                continue;
            };
            if paren_at(i + 3) {
                locals.add_columns(NormalizedName::new(name), column_rows(toks, i + 3));
            }
        } else if tok.is_keyword("RETURNS") {
            // Multi-statement TVF: RETURNS @t TABLE (...)
            let Some(name) = word_at(i + 1).filter(|n| n.starts_with('@')) else {
                continue;
            };
            if keyword_at(i + 2, "TABLE") && paren_at(i + 3) {
                locals.add_columns(NormalizedName::new(name), column_rows(toks, i + 3));
            }
        } else if tok.is_keyword("INSERT") {
            let mut j = i + 1;
            if keyword_at(j, "INTO") {
                j += 1;
            }
            let Some(name) = word_at(j).filter(|n| is_local_table_name(n)) else {
                continue;
            };
            let columns = if paren_at(j + 1) {
                column_rows(toks, j + 1)
            } else {
                Vec::new()
            };
            locals.add_columns(NormalizedName::new(name), columns);
        } else if tok.is_keyword("INTO") {
            let after_insert = i > 0 && (toks[i - 1].is_keyword("INSERT") || toks[i - 1].is_keyword("MERGE"));
            if after_insert {
                continue;
            }
            let Some(name) = word_at(i + 1).filter(|n| n.starts_with('#')) else {
                continue;
            };
            locals.add_columns(NormalizedName::new(name), select_into_columns(toks, i));
        }
    }
    locals
}

/// Leading word of each top-level row in the paren block opened at `open`.
fn column_rows(toks: &[Tok], open: usize) -> Vec<NormalizedName> {
    let mut columns = Vec::new();
    let mut depth = 0usize;
    let mut row_start = true;
    for tok in &toks[open..] {
        match tok.token {
            Token::LParen => {
                depth += 1;
                continue;
            }
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                continue;
            }
            Token::Comma if depth == 1 => {
                row_start = true;
                continue;
            }
            _ => {}
        }
        if row_start && depth == 1 {
            row_start = false;
            if let Some(word) = tok.word() {
                let constraint = word.quote_style.is_none() && is_constraint_keyword(&word.value);
                if !constraint {
                    columns.push(NormalizedName::new(&word.value));
                }
            }
        }
    }
    columns
}

/// Output column names of the `SELECT` list that precedes `INTO` at `into`.
fn select_into_columns(toks: &[Tok], into: usize) -> Vec<NormalizedName> {
    let mut depth = 0usize;
    let mut select_at = None;
    for idx in (0..into).rev() {
        match toks[idx].token {
            Token::RParen => depth += 1,
            Token::LParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && toks[idx].is_keyword("SELECT") => {
                select_at = Some(idx);
                break;
            }
            _ => {}
        }
    }
    let Some(select_at) = select_at else {
        return Vec::new();
    };

    let mut items: Vec<&[Tok]> = Vec::new();
    let mut depth = 0usize;
    let mut item_start = select_at + 1;
    for idx in select_at + 1..into {
        match toks[idx].token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                items.push(&toks[item_start..idx]);
                item_start = idx + 1;
            }
            _ => {}
        }
    }
    items.push(&toks[item_start..into]);

    items
        .into_iter()
        .filter_map(|item| {
            // `Alias = expr` form
            if let [first, second, ..] = item {
                if second.token == Token::Eq {
                    return first.ident();
                }
            }
            item.last().and_then(Tok::ident)
        })
        .filter(|name| !is_sql_keyword(name))
        .map(NormalizedName::new)
        .collect()
}
