//! Unit tests for the structured-parse subsystem
//!
//! Cache expiry runs on a manual clock; pool supervision runs against a
//! backend that crashes or stalls on demand.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rust_sqlindex::model::{AliasMap, CandidateTableSet, NormalizedName};
use rust_sqlindex::structured::{
    disambiguate, Disambiguation, ManualClock, ParsePool, RestartPolicy, SqlTree,
    SqlparserBackend, StatementParser, TtlCache,
};
use rust_sqlindex::{DialectOptions, ParseConfig, ParseFailure};

/// Panics on statements containing `CRASH`, sleeps on `STALL`.
#[derive(Default)]
struct FlakyBackend {
    calls: AtomicUsize,
}

impl StatementParser for FlakyBackend {
    fn parse(&self, text: &str, dialect: DialectOptions) -> Result<SqlTree, ParseFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("CRASH") {
            panic!("backend crashed on purpose");
        }
        if text.contains("STALL") {
            thread::sleep(Duration::from_millis(500));
        }
        SqlparserBackend.parse(text, dialect)
    }
}

fn fast_restart_config(pool_size: usize) -> ParseConfig {
    ParseConfig {
        pool_size,
        restart: RestartPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_consecutive_failures: 6,
        },
        ..ParseConfig::default()
    }
}

fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

// ============================================================================
// Cache Tests
// ============================================================================

#[test]
fn test_cache_evicts_oldest_insertion() {
    let mut cache = TtlCache::new(2, Duration::from_secs(60));
    cache.insert("a".to_string(), 1);
    cache.insert("b".to_string(), 2);
    cache.insert("c".to_string(), 3);
    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.get("b"), Some(2));
    assert_eq!(cache.get("c"), Some(3));
}

#[test]
fn test_cache_entry_past_ttl_is_absent_and_evicted() {
    let clock = Arc::new(ManualClock::new());
    let mut cache = TtlCache::with_clock(8, Duration::from_secs(600), clock.clone());
    cache.insert("stmt".to_string(), Some(1));
    clock.advance(Duration::from_secs(601));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("stmt"), None);
    assert_eq!(cache.len(), 0);
}

// ============================================================================
// Pool Tests
// ============================================================================

#[test]
fn test_oversized_statement_never_reaches_a_worker() {
    let backend = Arc::new(FlakyBackend::default());
    let config = ParseConfig {
        max_statement_len: 32,
        ..fast_restart_config(1)
    };
    let pool = ParsePool::new(&config, backend.clone()).unwrap();
    let long = format!("SELECT {} FROM t", "a, ".repeat(50));
    assert!(pool.submit(&long, DialectOptions::TSql, Duration::from_secs(1)).is_none());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(pool.stats().jobs_submitted, 0);
}

#[test]
fn test_timeout_returns_none_without_error() {
    let pool = ParsePool::new(&fast_restart_config(1), Arc::new(FlakyBackend::default())).unwrap();
    let started = Instant::now();
    assert!(pool
        .submit("SELECT 1 AS STALL", DialectOptions::TSql, Duration::from_millis(30))
        .is_none());
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[test]
fn test_seventh_respawn_is_suppressed() {
    let backend = Arc::new(FlakyBackend::default());
    let pool = ParsePool::new(&fast_restart_config(1), backend.clone()).unwrap();

    for attempt in 0..6 {
        assert!(eventually(|| pool.is_ready()), "no live worker before attempt {attempt}");
        let statement = format!("SELECT {attempt} AS CRASH");
        assert!(pool.submit(&statement, DialectOptions::TSql, Duration::from_secs(5)).is_none());
    }

    assert!(eventually(|| pool.stats().degraded_slots == 1));
    thread::sleep(Duration::from_millis(50));
    let stats = pool.stats();
    assert_eq!(stats.spawn_attempts, 6);
    assert_eq!(stats.live_workers, 0);
    assert!(!pool.is_ready());
}

#[test]
fn test_readiness_follows_remaining_workers() {
    let config = ParseConfig {
        restart: RestartPolicy {
            max_consecutive_failures: 1,
            ..fast_restart_config(2).restart
        },
        ..fast_restart_config(2)
    };
    let pool = ParsePool::new(&config, Arc::new(FlakyBackend::default())).unwrap();

    assert!(pool.submit("SELECT 1 AS CRASH", DialectOptions::TSql, Duration::from_secs(5)).is_none());
    assert!(eventually(|| pool.stats().degraded_slots == 1));
    assert!(pool.is_ready());

    assert!(pool.submit("SELECT 2 AS CRASH", DialectOptions::TSql, Duration::from_secs(5)).is_none());
    assert!(eventually(|| pool.stats().degraded_slots == 2));
    assert!(!pool.is_ready());
}

// ============================================================================
// Disambiguation Tests
// ============================================================================

fn candidates(names: &[&str]) -> CandidateTableSet {
    names.iter().map(|name| NormalizedName::new(name)).collect()
}

#[test]
fn test_update_statement_settles_bare_column() {
    let sql = "UPDATE e SET Name = 'x' FROM Employee e JOIN Department d ON d.Id = e.DepartmentId";
    let tree = SqlparserBackend.parse(sql, DialectOptions::TSql).unwrap();
    let mut aliases = AliasMap::new();
    aliases.bind_table("e", NormalizedName::new("employee"));
    aliases.bind_table("d", NormalizedName::new("department"));
    let result = disambiguate(
        Some(&tree),
        &NormalizedName::new("name"),
        &aliases,
        &candidates(&["employee", "department"]),
    );
    assert_eq!(result, Disambiguation::Accepted(NormalizedName::new("employee")));
}

#[test]
fn test_nested_select_settles_inner_column() {
    let sql = "SELECT d.Id FROM Department d WHERE d.Id IN (SELECT DepartmentId FROM Employee WHERE Name = 'x')";
    let tree = SqlparserBackend.parse(sql, DialectOptions::TSql).unwrap();
    let result = disambiguate(
        Some(&tree),
        &NormalizedName::new("name"),
        &AliasMap::new(),
        &candidates(&["employee", "department"]),
    );
    assert_eq!(result, Disambiguation::Accepted(NormalizedName::new("employee")));
}
