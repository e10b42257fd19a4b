//! Centralized identifier handling utilities for T-SQL scanning.
//!
//! Every index key goes through [`normalize_name`], so bracket/quote handling,
//! case folding and `dbo` schema elision live in exactly one place.
//!
//! # Examples
//!
//! ```
//! use rust_sqlindex::parser::{normalize_identifier, normalize_name};
//!
//! assert_eq!(normalize_identifier("[MyTable]"), "MyTable");
//! assert_eq!(normalize_name("[dbo].[Employee]"), "employee");
//! assert_eq!(normalize_name("Sales.[Order]"), "sales.order");
//! ```

use std::ops::Range;

/// Strips brackets `[]`, double quotes `""` and backticks from an identifier.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_identifier("[MyTable]"), "MyTable");
/// assert_eq!(normalize_identifier("\"MyColumn\""), "MyColumn");
/// assert_eq!(normalize_identifier("  [Trimmed]  "), "Trimmed");
/// ```
pub fn normalize_identifier(ident: &str) -> String {
    ident
        .trim()
        .trim_matches(|c| c == '[' || c == ']' || c == '"' || c == '`')
        .trim()
        .to_string()
}

/// Canonicalizes a possibly schema-qualified identifier into an index key.
///
/// Parts are split on `.`, unwrapped, trimmed and lowercased. A two-part name
/// whose schema is `dbo` loses the schema; any other qualification is kept.
/// Empty or unusable input yields an empty string.
pub fn normalize_name(raw: &str) -> String {
    let parts: Vec<String> = raw
        .split('.')
        .map(|part| normalize_identifier(part).to_lowercase())
        .collect();

    if parts.iter().all(|p| p.is_empty()) {
        return String::new();
    }

    match parts.as_slice() {
        [schema, object] if schema == "dbo" => object.clone(),
        _ => parts.join("."),
    }
}

/// Returns the last part of a normalized name (`sales.orders` -> `orders`).
pub fn unqualified_part(normalized: &str) -> &str {
    normalized.rsplit('.').next().unwrap_or(normalized)
}

/// Splits a possibly qualified name into the byte ranges of its parts,
/// each range excluding surrounding whitespace and `[]`/`""` delimiters.
///
/// Dots inside delimiters do not split.
pub(crate) fn qualified_part_spans(raw: &str) -> Vec<Range<usize>> {
    let bytes = raw.as_bytes();
    let mut parts = Vec::new();
    let mut part_start = 0;
    let mut closing: Option<u8> = None;

    for (i, &byte) in bytes.iter().enumerate() {
        match closing {
            Some(close) if byte == close => closing = None,
            Some(_) => {}
            None => match byte {
                b'[' => closing = Some(b']'),
                b'"' => closing = Some(b'"'),
                b'.' => {
                    parts.push(part_start..i);
                    part_start = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(part_start..bytes.len());

    parts
        .into_iter()
        .map(|part| {
            let mut start = part.start;
            let mut end = part.end;
            while start < end && bytes[start].is_ascii_whitespace() {
                start += 1;
            }
            while end > start && bytes[end - 1].is_ascii_whitespace() {
                end -= 1;
            }
            if end - start >= 2
                && matches!((bytes[start], bytes[end - 1]), (b'[', b']') | (b'"', b'"'))
            {
                start += 1;
                end -= 1;
            }
            start..end
        })
        .collect()
}

/// Raw name with delimiters removed from every part (`[dbo].[My Table]` -> `dbo.My Table`).
pub fn display_name(raw: &str) -> String {
    qualified_part_spans(raw)
        .into_iter()
        .map(|span| &raw[span])
        .collect::<Vec<_>>()
        .join(".")
}

/// Checks if a string is a bracketed identifier (starts with `[` and ends with `]`).
pub fn is_bracketed(ident: &str) -> bool {
    let trimmed = ident.trim();
    trimmed.starts_with('[') && trimmed.ends_with(']')
}

/// Checks if a string is a quoted identifier (starts and ends with `"`).
pub fn is_double_quoted(ident: &str) -> bool {
    let trimmed = ident.trim();
    trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"')
}

/// True for identifiers that are delimited and therefore never keywords.
pub fn is_delimited(ident: &str) -> bool {
    is_bracketed(ident) || is_double_quoted(ident)
}

/// True for names that only exist inside a routine (`@table_var`, `#temp`, `##global_temp`).
pub fn is_local_table_name(name: &str) -> bool {
    name.starts_with('@') || name.starts_with('#')
}
