//! Asynchronous correction tests
//!
//! Provisional references are published synchronously; these tests check what
//! the structured-parse pass does to them afterwards.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_sqlindex::model::NormalizedName;
use rust_sqlindex::structured::{
    ColumnRef, SelectNode, SqlNode, SqlTree, SqlparserBackend, StatementParser, TableRef,
};
use rust_sqlindex::{DialectOptions, IndexConfig, IndexOutcome, ParseConfig, ParseFailure};

use crate::common::{TestWorkspace, SCHEMA};

const AMBIGUOUS_SELECT: &str =
    "SELECT Name FROM Employee e JOIN Department d ON d.Id = e.DepartmentId";

fn parse_enabled() -> IndexConfig {
    IndexConfig::default().with_parse(ParseConfig {
        pool_size: 2,
        ..ParseConfig::default()
    })
}

/// Answers every statement as if it read `SELECT Name FROM <table>`.
struct CannedOwner(&'static str);

impl StatementParser for CannedOwner {
    fn parse(&self, _text: &str, _dialect: DialectOptions) -> Result<SqlTree, ParseFailure> {
        Ok(SqlTree {
            statements: vec![SqlNode::Select(SelectNode {
                from: vec![SqlNode::TableRef(TableRef {
                    name: NormalizedName::new(self.0),
                    alias: None,
                })],
                columns: vec![ColumnRef {
                    qualifier: None,
                    name: NormalizedName::new("Name"),
                }],
                nested: Vec::new(),
            })],
        })
    }
}

/// sqlparser, after a delay.
struct SlowBackend(Duration);

impl StatementParser for SlowBackend {
    fn parse(&self, text: &str, dialect: DialectOptions) -> Result<SqlTree, ParseFailure> {
        thread::sleep(self.0);
        SqlparserBackend.parse(text, dialect)
    }
}

struct AlwaysCrash;

impl StatementParser for AlwaysCrash {
    fn parse(&self, _text: &str, _dialect: DialectOptions) -> Result<SqlTree, ParseFailure> {
        panic!("parser unavailable")
    }
}

#[test]
fn test_simulated_disambiguation_retracts_other_candidate() {
    let ctx = TestWorkspace::with_parser(parse_enabled(), Arc::new(CannedOwner("Employee")));
    ctx.index_text("schema.sql", SCHEMA);
    ctx.index_text("q.sql", AMBIGUOUS_SELECT);

    ctx.settle();
    assert_eq!(ctx.names_at("q.sql", 0, 7), vec!["employee.name"]);
    // Unrelated positions keep their references
    assert_eq!(ctx.names_at("q.sql", 0, 51), vec!["department.id"]);
    assert_eq!(ctx.workspace.stats().applied_corrections, 1);
}

#[test]
fn test_provisional_references_exist_before_corrections() {
    let ctx = TestWorkspace::heuristic();
    ctx.index_text("schema.sql", SCHEMA);
    let outcome = ctx.index_text("q.sql", AMBIGUOUS_SELECT);
    let IndexOutcome::Indexed(file) = outcome else {
        panic!("query was skipped");
    };
    assert_eq!(file.ambiguities, 1);
    assert_eq!(ctx.names_at("q.sql", 0, 7), vec!["department.name", "employee.name"]);
}

#[test]
fn test_real_parser_settles_update_targets_independently() {
    let ctx = TestWorkspace::with_parser(parse_enabled(), Arc::new(SqlparserBackend));
    ctx.index_text("schema.sql", SCHEMA);
    let text = "\
UPDATE e SET Name = 'x' FROM Employee e JOIN Department d ON d.Id = e.DepartmentId;
UPDATE d SET Name = 'y' FROM Department d JOIN Employee e ON d.Id = e.DepartmentId;";
    ctx.index_text("q.sql", text);
    assert_eq!(ctx.names_at("q.sql", 0, 13), vec!["department.name", "employee.name"]);

    ctx.settle();
    assert_eq!(ctx.names_at("q.sql", 0, 13), vec!["employee.name"]);
    assert_eq!(ctx.names_at("q.sql", 1, 13), vec!["department.name"]);
    let stats = ctx.workspace.stats();
    assert_eq!(stats.scheduled_corrections, 2);
    assert_eq!(stats.applied_corrections, 2);
}

#[test]
fn test_inconclusive_parse_leaves_ambiguity_standing() {
    let ctx = TestWorkspace::with_parser(parse_enabled(), Arc::new(SqlparserBackend));
    ctx.index_text("schema.sql", SCHEMA);
    ctx.index_text("q.sql", AMBIGUOUS_SELECT);

    ctx.settle();
    assert_eq!(ctx.names_at("q.sql", 0, 7), vec!["department.name", "employee.name"]);
    assert_eq!(ctx.workspace.stats().inconclusive_corrections, 1);
}

#[test]
fn test_owner_without_provisional_reference_retracts_nothing() {
    let ctx = TestWorkspace::with_parser(parse_enabled(), Arc::new(SqlparserBackend));
    ctx.index_text("schema.sql", SCHEMA);
    ctx.index_text("audit.sql", "CREATE TABLE Audit (AuditId INT, Note VARCHAR(50))");
    // The only qualified `Name` belongs to Audit, which has no such column
    ctx.index_text(
        "q.sql",
        "SELECT Name FROM Employee e JOIN Department d ON d.Id = e.DepartmentId JOIN Audit a ON a.Name = 'x'",
    );
    assert_eq!(ctx.names_at("q.sql", 0, 7), vec!["department.name", "employee.name"]);

    ctx.settle();
    assert_eq!(ctx.names_at("q.sql", 0, 7), vec!["department.name", "employee.name"]);
    let stats = ctx.workspace.stats();
    assert_eq!(stats.applied_corrections, 0);
    assert_eq!(stats.rejected_corrections, 1);
}

#[test]
fn test_owner_outside_candidates_is_ignored() {
    let ctx = TestWorkspace::with_parser(parse_enabled(), Arc::new(CannedOwner("Contractor")));
    ctx.index_text("schema.sql", SCHEMA);
    ctx.index_text("q.sql", AMBIGUOUS_SELECT);

    ctx.settle();
    assert_eq!(ctx.names_at("q.sql", 0, 7), vec!["department.name", "employee.name"]);
    assert_eq!(ctx.workspace.stats().rejected_corrections, 1);
}

#[test]
fn test_correction_for_superseded_version_is_discarded() {
    let config = IndexConfig::default().with_parse(ParseConfig {
        pool_size: 1,
        ..ParseConfig::default()
    });
    let ctx = TestWorkspace::with_parser(config, Arc::new(SlowBackend(Duration::from_millis(150))));
    ctx.index_text("schema.sql", SCHEMA);
    let update = "UPDATE e SET Name = 'x' FROM Employee e JOIN Department d ON d.Id = e.DepartmentId";
    ctx.index_text("q.sql", update);
    // Rewrite the file while the first job is still parsing
    ctx.index_text("q.sql", &format!("{update}\n-- edited"));

    ctx.settle();
    let stats = ctx.workspace.stats();
    assert_eq!(stats.scheduled_corrections, 2);
    assert_eq!(stats.stale_corrections, 1);
    assert_eq!(stats.applied_corrections, 1);
    assert_eq!(ctx.names_at("q.sql", 0, 13), vec!["employee.name"]);
}

#[test]
fn test_closed_file_is_not_resurrected() {
    let config = IndexConfig::default().with_parse(ParseConfig {
        pool_size: 1,
        ..ParseConfig::default()
    });
    let ctx = TestWorkspace::with_parser(config, Arc::new(SlowBackend(Duration::from_millis(100))));
    ctx.index_text("schema.sql", SCHEMA);
    ctx.index_text(
        "q.sql",
        "UPDATE e SET Name = 'x' FROM Employee e JOIN Department d ON d.Id = e.DepartmentId",
    );
    ctx.workspace.deindex_file(&ctx.uri("q.sql"));

    ctx.settle();
    assert!(ctx.workspace.index().references_in_file(&ctx.uri("q.sql")).is_empty());
    assert_eq!(ctx.workspace.stats().stale_corrections, 1);
}

#[test]
fn test_crashing_parser_degrades_to_heuristic_results() {
    let mut config = parse_enabled();
    config.parse.restart.base_delay = Duration::from_millis(1);
    config.parse.restart.max_delay = Duration::from_millis(2);
    config.parse.restart.max_consecutive_failures = 1;
    let ctx = TestWorkspace::with_parser(config, Arc::new(AlwaysCrash));
    ctx.index_text("schema.sql", SCHEMA);

    // Distinct texts so no statement is answered from the cache
    for i in 0..3 {
        let uri = format!("q{i}.sql");
        ctx.index_text(&uri, &format!("{AMBIGUOUS_SELECT} AND {i} = {i}"));
    }
    ctx.settle();

    for i in 0..3 {
        let uri = format!("q{i}.sql");
        assert_eq!(ctx.names_at(&uri, 0, 7), vec!["department.name", "employee.name"]);
    }
    let stats = ctx.workspace.stats();
    assert_eq!(stats.inconclusive_corrections, 3);
    assert!(!ctx.workspace.is_parse_ready());
    assert_eq!(stats.pool.map(|pool| pool.degraded_slots), Some(2));
}
