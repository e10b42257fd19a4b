//! Index element definitions

use std::borrow::Borrow;
use std::fmt;

use crate::parser::normalize_name;

/// Canonical, lowercase, bracket-stripped, `dbo`-elided identifier.
///
/// This is the universal index key; equality and hashing use the normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NormalizedName(String);

impl NormalizedName {
    /// Normalize a raw identifier.
    pub fn new(raw: &str) -> Self {
        Self(normalize_name(raw))
    }

    /// Wrap a string that is already normalized.
    ///
    /// Used for composite keys such as `table.column` built from normalized parts.
    pub(crate) fn from_normalized(value: String) -> Self {
        Self(value)
    }

    /// Qualified column key `table.column`.
    pub fn qualified(table: &NormalizedName, column: &NormalizedName) -> Self {
        Self(format!("{}.{}", table.0, column.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last dotted part (`sales.orders` -> `orders`).
    pub fn unqualified(&self) -> &str {
        crate::parser::unqualified_part(&self.0)
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NormalizedName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NormalizedName {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Kind of schema object introduced by a `CREATE` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Table,
    View,
    Procedure,
    Function,
    TableType,
}

impl SymbolKind {
    /// Kinds whose definitions carry a column list.
    pub fn has_columns(self) -> bool {
        matches!(self, SymbolKind::Table | SymbolKind::View | SymbolKind::TableType)
    }
}

/// Kind of usage recorded for a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceKind {
    Table,
    Column,
    Parameter,
    /// `EXEC <procedure>` call site
    Routine,
}

/// A column declared by a table/type definition or projected by a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: NormalizedName,
    /// Identifier as written, without brackets
    pub raw_name: String,
    /// Best-effort declared type (first token after the name)
    pub data_type: Option<String>,
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

/// One defining `CREATE` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDef {
    pub name: NormalizedName,
    pub raw_name: String,
    pub uri: String,
    pub line: u32,
    /// Span of the object name on `line`
    pub start_col: u32,
    pub end_col: u32,
    pub kind: SymbolKind,
    pub columns: Vec<ColumnDef>,
}

impl SymbolDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }

    pub fn location(&self) -> Location {
        Location {
            uri: self.uri.clone(),
            line: self.line,
            start_col: self.start_col,
            end_col: self.end_col,
        }
    }

    pub fn column_location(&self, column: &ColumnDef) -> Location {
        Location {
            uri: self.uri.clone(),
            line: column.line,
            start_col: column.start_col,
            end_col: column.end_col,
        }
    }
}

/// A positioned usage of a table, column, parameter or routine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceDef {
    /// `employee`, `employee.name`, `@paramname`
    pub name: NormalizedName,
    pub uri: String,
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
    pub kind: ReferenceKind,
}

impl ReferenceDef {
    /// Exact position key used to retract provisional references.
    pub fn position(&self) -> SourceSpan {
        SourceSpan {
            line: self.line,
            start_col: self.start_col,
            end_col: self.end_col,
        }
    }

    pub fn location(&self) -> Location {
        Location {
            uri: self.uri.clone(),
            line: self.line,
            start_col: self.start_col,
            end_col: self.end_col,
        }
    }
}

/// Line/column range inside one file (0-based, columns in characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceSpan {
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

/// A span in a specific file, as handed to editor consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub uri: String,
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_name_equality_uses_canonical_form() {
        assert_eq!(NormalizedName::new("[dbo].[Employee]"), NormalizedName::new("employee"));
        assert_ne!(NormalizedName::new("hr.Employee"), NormalizedName::new("Employee"));
    }

    #[test]
    fn test_qualified_column_key() {
        let key = NormalizedName::qualified(&"Employee".into(), &"[Name]".into());
        assert_eq!(key.as_str(), "employee.name");
    }

    #[test]
    fn test_borrow_lookup_by_str() {
        let mut set = std::collections::HashSet::new();
        set.insert(NormalizedName::new("Employee"));
        assert!(set.contains("employee"));
    }
}
