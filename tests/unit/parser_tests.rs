//! Unit tests for the heuristic scanners
//!
//! These exercise name normalization, definition extraction, statement
//! scopes and reference extraction through the public parser API.

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use rust_sqlindex::model::{AliasTarget, NormalizedName, ReferenceKind, SourceSpan, SymbolKind};
use rust_sqlindex::parser::{
    extract_definitions, extract_references, normalize_name, resolve_statement_scope,
    ColumnCatalog, ExtractedReferences, FileScopes,
};

/// Column catalog backed by a plain map
#[derive(Default)]
struct Catalog(HashMap<&'static str, Vec<&'static str>>);

impl Catalog {
    fn employees() -> Self {
        let mut map = HashMap::new();
        map.insert("employee", vec!["employeeid", "name", "departmentid"]);
        map.insert("department", vec!["id", "name"]);
        Self(map)
    }
}

impl ColumnCatalog for Catalog {
    fn table_has_column(&self, table: &str, column: &str) -> bool {
        self.0.get(table).is_some_and(|columns| columns.contains(&column))
    }
}

impl Catalog {
    fn with(tables: &[(&'static str, &[&'static str])]) -> Self {
        Self(tables.iter().map(|(table, columns)| (*table, columns.to_vec())).collect())
    }
}

fn references(sql: &str) -> ExtractedReferences {
    references_with(sql, &Catalog::employees())
}

fn references_with(sql: &str, catalog: &Catalog) -> ExtractedReferences {
    let scopes = FileScopes::analyze(sql);
    extract_references("file:///q.sql", sql, &scopes, catalog, 10_000)
}

fn names_at(refs: &ExtractedReferences, line: u32, start_col: u32) -> Vec<String> {
    let mut names: Vec<String> = refs
        .references
        .iter()
        .filter(|r| r.line == line && r.start_col == start_col)
        .map(|r| r.name.to_string())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Name Normalization Tests
// ============================================================================

#[test]
fn test_normalization_examples() {
    assert_eq!(normalize_name("[dbo].[Employee]"), "employee");
    assert_eq!(normalize_name("Employee"), "employee");
    assert_eq!(normalize_name("[Sales].[Orders]"), "sales.orders");
}

#[test]
fn test_normalization_is_idempotent() {
    for raw in ["[dbo].[Employee]", "\"hr\".\"Person\"", "[Order Details]", "@Param", "#tmp", "x.y.z"] {
        let once = normalize_name(raw);
        assert_eq!(normalize_name(&once), once, "normalizing {raw:?} twice changed it");
    }
}

// ============================================================================
// Definition Extraction Tests
// ============================================================================

#[test]
fn test_table_definition_columns() {
    let sql = "CREATE TABLE Employee (EmployeeId INT PRIMARY KEY, Name VARCHAR(50), DepartmentId INT)";
    let symbols = extract_definitions("file:///t.sql", sql);
    assert_eq!(symbols.len(), 1);
    let columns: Vec<&str> = symbols[0].columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["employeeid", "name", "departmentid"]);
    assert_eq!(symbols[0].kind, SymbolKind::Table);
}

#[test]
fn test_definitions_across_batches() {
    let sql = "\
CREATE TABLE [dbo].[Employee] (
    [EmployeeId] INT NOT NULL,
    [Name] VARCHAR(50)
)
GO
CREATE VIEW dbo.Staff AS SELECT EmployeeId, Name AS FullName FROM Employee
GO
CREATE PROCEDURE dbo.usp_Load @Id INT AS SELECT 1
";
    let symbols = extract_definitions("file:///t.sql", sql);
    let kinds: Vec<(&str, SymbolKind)> = symbols.iter().map(|s| (s.name.as_str(), s.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("employee", SymbolKind::Table),
            ("staff", SymbolKind::View),
            ("usp_load", SymbolKind::Procedure),
        ]
    );
    let view_columns: Vec<&str> = symbols[1].columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(view_columns, vec!["employeeid", "fullname"]);
    assert_eq!(symbols[0].columns[1].line, 2);
}

// ============================================================================
// Scope Resolution Tests
// ============================================================================

#[test]
fn test_statement_scope_aliases_and_candidates() {
    let sql = "SELECT 1\nGO\nSELECT e.Name, x.Total FROM Employee e JOIN (SELECT 1 AS Total) x ON 1 = 1";
    let offset = sql.find("e.Name").unwrap();
    let scope = resolve_statement_scope(sql, offset);
    assert_eq!(
        scope.aliases.get("e"),
        Some(&AliasTarget::Table(NormalizedName::new("employee")))
    );
    assert_eq!(scope.aliases.get("X"), Some(&AliasTarget::Subquery));
    let candidates: Vec<&str> = scope.candidate_tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(candidates, vec!["employee"]);
    assert!(scope.text(sql).starts_with("SELECT e.Name"));
}

// ============================================================================
// Reference Extraction Tests
// ============================================================================

#[test]
fn test_alias_qualified_reference_position() {
    let refs = references("SELECT e.Name FROM Employee e");
    let column = refs
        .references
        .iter()
        .find(|r| r.name.as_str() == "employee.name")
        .expect("employee.name reference");
    assert_eq!(column.kind, ReferenceKind::Column);
    assert_eq!(column.position(), SourceSpan { line: 0, start_col: 9, end_col: 13 });
}

#[test]
fn test_ambiguous_column_is_provisional_for_every_owner() {
    let refs = references("SELECT Name FROM Employee e JOIN Department d ON d.Id = e.DepartmentId");
    assert_eq!(names_at(&refs, 0, 7), vec!["department.name", "employee.name"]);
    assert_eq!(refs.ambiguities.len(), 1);
    let candidates: Vec<&str> = refs.ambiguities[0]
        .candidates
        .iter()
        .map(|t| t.as_str())
        .collect();
    assert_eq!(candidates, vec!["department", "employee"]);
}

#[test]
fn test_unknown_columns_emit_nothing() {
    let refs = references("SELECT Salary FROM Employee");
    assert!(names_at(&refs, 0, 7).is_empty());
    assert!(refs.ambiguities.is_empty());
}

#[test]
fn test_bare_column_named_like_a_joined_table() {
    let catalog = Catalog::with(&[("employee", &["name", "department"]), ("department", &["id"])]);
    let refs = references_with(
        "SELECT e.Name, Department FROM Employee e JOIN Department d ON d.Id = 1",
        &catalog,
    );
    assert_eq!(names_at(&refs, 0, 15), vec!["employee.department"]);
}

#[test]
fn test_type_named_columns_outside_type_position() {
    let catalog = Catalog::with(&[("event", &["date", "text"])]);
    let sql = "SELECT Date, Text FROM Event WHERE Date > CONVERT(DATE, @since)";
    let refs = references_with(sql, &catalog);
    assert_eq!(names_at(&refs, 0, 7), vec!["event.date"]);
    assert_eq!(names_at(&refs, 0, 13), vec!["event.text"]);
    assert_eq!(names_at(&refs, 0, 35), vec!["event.date"]);
    assert!(names_at(&refs, 0, 50).is_empty());
}

#[test]
fn test_malformed_sql_degrades_to_partial_results() {
    let refs = references("SELECT e.Name FROM Employee e WHERE (((\nAND x = ");
    assert_eq!(names_at(&refs, 0, 9), vec!["employee.name"]);
}

#[test]
fn test_procedure_parameters_and_usages() {
    let sql = "\
CREATE PROCEDURE dbo.GetStaff @DeptId INT, @Active BIT = 1
AS
SELECT Name FROM Employee WHERE DepartmentId = @DeptId";
    let refs = references(sql);
    let mut params: Vec<(String, u32)> = refs
        .references
        .iter()
        .filter(|r| r.kind == ReferenceKind::Parameter)
        .map(|r| (r.name.to_string(), r.line))
        .collect();
    params.sort();
    assert_eq!(
        params,
        vec![
            ("@active".to_string(), 0),
            ("@deptid".to_string(), 0),
            ("@deptid".to_string(), 2),
        ]
    );
    assert_eq!(names_at(&refs, 2, 7), vec!["employee.name"]);
}
