//! Column registry for schema-aware unqualified column resolution
//!
//! Maps tables, views and table types to their columns so bare column names can
//! be resolved by checking which tables in scope actually have them. Each file
//! contributing a definition is tracked; the most recently indexed definition of
//! a table wins, and removing a file falls back to the previous contributor.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::model::{NormalizedName, SymbolDef};
use crate::parser::ColumnCatalog;

#[derive(Debug, Clone)]
struct Contribution {
    uri: String,
    seq: u64,
    /// Declaration order is kept for display
    columns: IndexSet<NormalizedName>,
}

/// Registry mapping normalized table names to their column names.
#[derive(Debug, Default)]
pub struct ColumnRegistry {
    table_columns: HashMap<NormalizedName, Vec<Contribution>>,
    next_seq: u64,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the columns of every column-bearing symbol defined in `uri`.
    ///
    /// Callers purge the file first with [`ColumnRegistry::remove_file`].
    pub fn add_file(&mut self, uri: &str, symbols: &[SymbolDef]) {
        for symbol in symbols.iter().filter(|s| s.kind.has_columns()) {
            self.next_seq += 1;
            let columns: IndexSet<NormalizedName> =
                symbol.columns.iter().map(|c| c.name.clone()).collect();
            let contributions = self.table_columns.entry(symbol.name.clone()).or_default();
            // A table defined twice in one file keeps its last definition
            contributions.retain(|c| c.uri != uri);
            contributions.push(Contribution {
                uri: uri.to_string(),
                seq: self.next_seq,
                columns,
            });
        }
    }

    /// Drop every contribution made by `uri`.
    pub fn remove_file(&mut self, uri: &str) {
        self.table_columns.retain(|_, contributions| {
            contributions.retain(|c| c.uri != uri);
            !contributions.is_empty()
        });
    }

    fn latest(&self, table: &str) -> Option<&Contribution> {
        self.table_columns
            .get(table)
            .and_then(|contributions| contributions.iter().max_by_key(|c| c.seq))
    }

    /// Columns of `table` from its latest definition, in declaration order.
    pub fn columns(&self, table: &str) -> Option<&IndexSet<NormalizedName>> {
        self.latest(table).map(|c| &c.columns)
    }

    /// Check if a table has a specific column; both arguments are normalized names.
    pub fn table_has_column(&self, table: &str, column: &str) -> bool {
        self.latest(table)
            .is_some_and(|c| c.columns.contains(column))
    }

    /// Every table that declares `column`.
    pub fn tables_with_column(&self, column: &str) -> Vec<&NormalizedName> {
        let mut tables: Vec<&NormalizedName> = self
            .table_columns
            .keys()
            .filter(|table| self.table_has_column(table.as_str(), column))
            .collect();
        tables.sort();
        tables
    }

    /// Get the number of tables registered
    pub fn table_count(&self) -> usize {
        self.table_columns.len()
    }
}

impl ColumnCatalog for ColumnRegistry {
    fn table_has_column(&self, table: &str, column: &str) -> bool {
        ColumnRegistry::table_has_column(self, table, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract_definitions;

    fn defs(uri: &str, sql: &str) -> Vec<SymbolDef> {
        extract_definitions(uri, sql)
    }

    #[test]
    fn test_table_has_column() {
        let mut registry = ColumnRegistry::new();
        registry.add_file(
            "file:///a.sql",
            &defs("file:///a.sql", "CREATE TABLE Employee (EmployeeId INT, Name VARCHAR(50))"),
        );
        assert!(registry.table_has_column("employee", "name"));
        assert!(!registry.table_has_column("employee", "salary"));
        assert!(!registry.table_has_column("department", "name"));
        assert_eq!(registry.table_count(), 1);
    }

    #[test]
    fn test_latest_definition_wins_and_removal_restores() {
        let mut registry = ColumnRegistry::new();
        registry.add_file("file:///a.sql", &defs("file:///a.sql", "CREATE TABLE T (A INT)"));
        registry.add_file("file:///b.sql", &defs("file:///b.sql", "CREATE TABLE T (B INT)"));
        assert!(registry.table_has_column("t", "b"));
        assert!(!registry.table_has_column("t", "a"));

        registry.remove_file("file:///b.sql");
        assert!(registry.table_has_column("t", "a"));

        registry.remove_file("file:///a.sql");
        assert_eq!(registry.table_count(), 0);
    }

    #[test]
    fn test_tables_with_column() {
        let mut registry = ColumnRegistry::new();
        let sql = "CREATE TABLE Employee (Id INT, Name INT)\nCREATE TABLE Department (Id INT)\nCREATE PROCEDURE p AS SELECT 1";
        registry.add_file("file:///a.sql", &defs("file:///a.sql", sql));

        assert_eq!(
            registry.tables_with_column("name"),
            vec![&NormalizedName::new("employee")]
        );
        assert_eq!(registry.tables_with_column("id").len(), 2);
        assert_eq!(registry.table_count(), 2);
    }
}
