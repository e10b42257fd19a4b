//! Workspace scanning and index query tests

use pretty_assertions::assert_eq;
use rust_sqlindex::{IndexConfig, IndexOutcome, ReferenceKind, SkipReason};

use crate::common::{relative_to, TestWorkspace, SCHEMA};

#[test]
fn test_scan_indexes_sql_files_and_skips_the_rest() {
    let ctx = TestWorkspace::heuristic();
    ctx.write("Tables/Schema.sql", SCHEMA);
    ctx.write("Queries/staff.sql", "SELECT e.Name FROM Employee e");
    ctx.write("Deployment/PostDeploy.sql", "SELECT Name FROM Employee");
    ctx.write("README.md", "# not sql");
    ctx.write("Big/huge.sql", format!("SELECT 1\n{}", "-- filler line\n".repeat(1_000)));

    let scan = ctx.scan();
    assert_eq!(scan.indexed, 2);
    assert_eq!(scan.skipped, 2);

    let files: Vec<String> = ctx
        .workspace
        .index()
        .indexed_files()
        .iter()
        .map(|uri| relative_to(&ctx.root, uri))
        .collect();
    assert_eq!(files, vec!["Queries/staff.sql", "Tables/Schema.sql"]);
}

#[test]
fn test_references_resolve_regardless_of_file_order() {
    let ctx = TestWorkspace::heuristic();
    // Sorted by name, the query file is read before the schema
    ctx.write("a_query.sql", "SELECT e.Name FROM Employee e");
    ctx.write("z_schema.sql", SCHEMA);
    ctx.scan();

    let references = ctx.workspace.get_references("employee.name");
    assert_eq!(references.len(), 1);
    assert_eq!(relative_to(&ctx.root, &references[0].uri), "a_query.sql");
    assert_eq!((references[0].line, references[0].start_col), (0, 9));
}

#[test]
fn test_columns_by_table_after_scan() {
    let ctx = TestWorkspace::heuristic();
    ctx.write("schema.sql", SCHEMA);
    ctx.scan();

    let columns: Vec<String> = ctx
        .workspace
        .index()
        .columns_for_table("[dbo].[Employee]")
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(columns, vec!["employeeid", "name", "departmentid"]);

    let mut owners: Vec<String> = ctx
        .workspace
        .index()
        .tables_with_column("Name")
        .iter()
        .map(ToString::to_string)
        .collect();
    owners.sort();
    assert_eq!(owners, vec!["department", "employee"]);
}

#[test]
fn test_windows_1252_and_bom_files_are_read() {
    let ctx = TestWorkspace::heuristic();
    ctx.write("bom.sql", "\u{FEFF}CREATE TABLE Caf\u{e9} (Id INT)");
    ctx.write("latin.sql", b"-- r\xe9sum\xe9\nCREATE TABLE Resume (Id INT)".as_slice());
    let scan = ctx.scan();
    assert_eq!(scan.indexed, 2);

    let bom = ctx.workspace.find_definitions("caf\u{e9}");
    assert_eq!(bom.len(), 1);
    assert_eq!(bom[0].start_col, 13);
    assert_eq!(ctx.workspace.find_definitions("resume")[0].line, 1);
}

#[test]
fn test_reindexing_same_content_is_stable() {
    let ctx = TestWorkspace::heuristic();
    ctx.index_text("schema.sql", SCHEMA);
    let query = "SELECT Name, e.EmployeeId FROM Employee e JOIN Department d ON d.Id = e.DepartmentId";

    ctx.index_text("q.sql", query);
    let first = ctx.workspace.index().references_in_file(&ctx.uri("q.sql"));
    let first_stats = ctx.workspace.index().stats();

    ctx.index_text("q.sql", query);
    let second = ctx.workspace.index().references_in_file(&ctx.uri("q.sql"));
    assert_eq!(first, second);
    assert_eq!(first_stats, ctx.workspace.index().stats());
}

#[test]
fn test_deindex_removes_definitions_and_references() {
    let ctx = TestWorkspace::heuristic();
    ctx.index_text("schema.sql", SCHEMA);
    ctx.index_text("q.sql", "SELECT e.Name FROM Employee e");
    assert_eq!(ctx.workspace.get_references("employee").len(), 1);

    ctx.workspace.deindex_file(&ctx.uri("q.sql"));
    assert!(ctx.workspace.get_references("employee").is_empty());
    assert!(ctx.workspace.get_references("employee.name").is_empty());
    assert_eq!(ctx.workspace.find_definitions("employee").len(), 1);
}

#[test]
fn test_reference_queries() {
    let ctx = TestWorkspace::heuristic();
    ctx.index_text("schema.sql", SCHEMA);
    ctx.index_text("a.sql", "SELECT e.Name FROM Employee e");
    ctx.index_text("b.sql", "SELECT Name FROM Employee\nEXEC dbo.usp_Refresh");

    assert_eq!(ctx.workspace.get_references("Employee.Name").len(), 2);
    let in_b = ctx.workspace.get_references_in_file("employee.name", &ctx.uri("b.sql"));
    assert_eq!(in_b.len(), 1);
    assert_eq!(in_b[0].kind, ReferenceKind::Column);

    let calls = ctx.workspace.get_references("usp_refresh");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, ReferenceKind::Routine);
}

#[test]
fn test_definition_lookups() {
    let ctx = TestWorkspace::heuristic();
    ctx.index_text("schema.sql", SCHEMA);

    let name_in_employee = ctx.workspace.find_column_locations("employee", "name");
    assert_eq!(name_in_employee.len(), 1);
    assert_eq!(name_in_employee[0].line, 2);

    // Objects first, then columns
    let any = ctx.workspace.find_any_locations("Department");
    assert_eq!(any.len(), 1);
    let names = ctx.workspace.find_any_locations("name");
    assert_eq!(names.len(), 2);
    assert!(ctx.workspace.find_any_locations("nothing_here").is_empty());
}

#[test]
fn test_reference_cap_truncates_file() {
    let ctx = TestWorkspace::with_config(
        IndexConfig::default()
            .without_structured_parse()
            .with_max_references(3),
    );
    ctx.index_text("schema.sql", SCHEMA);
    let outcome = ctx.index_text(
        "q.sql",
        "SELECT e.Name, e.EmployeeId, e.DepartmentId FROM Employee e",
    );
    let IndexOutcome::Indexed(file) = outcome else {
        panic!("query was skipped");
    };
    assert!(file.truncated);
    assert_eq!(file.references, 3);
}

#[test]
fn test_custom_exclusions() {
    let ctx = TestWorkspace::with_config(
        IndexConfig::default()
            .without_structured_parse()
            .with_excluded_fragment("scratch"),
    );
    let outcome = ctx.index_text("Scratch/tmp.sql", "CREATE TABLE T (A INT)");
    assert_eq!(
        outcome,
        IndexOutcome::Skipped(SkipReason::Excluded {
            pattern: "scratch".to_string()
        })
    );
}

#[test]
fn test_statement_scope_query() {
    let ctx = TestWorkspace::heuristic();
    let text = "\
CREATE PROCEDURE dbo.Report AS
BEGIN
    CREATE TABLE #totals (DeptId INT, Total INT)
    SELECT t.Total FROM #totals t JOIN Department d ON d.Id = t.DeptId
END";
    let scope = ctx.workspace.resolve_statement_scope(text, 3, 12);
    assert!(scope.candidate_tables.contains("#totals"));
    assert!(scope.candidate_tables.contains("department"));
    assert!(scope.local_tables.has_column("#totals", "total"));
}
