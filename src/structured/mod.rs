//! Structured parsing subsystem
//!
//! Exact-grammar parses run on a supervised worker pool behind a TTL cache;
//! the disambiguator reads the lowered trees to settle ambiguous columns.

mod cache;
mod disambiguate;
mod pool;
mod supervisor;
mod tree;

pub use cache::{cache_key, Clock, ManualClock, SystemClock, TtlCache};
pub use disambiguate::{column_owners, disambiguate, ColumnOwner, Disambiguation};
pub use pool::{ParsePool, PoolStats};
pub use supervisor::{ExitDecision, RestartPolicy, SlotSupervisor, WorkerState};
pub use tree::{
    ColumnRef, DeleteNode, InsertNode, NodeKind, SelectNode, SqlNode, SqlTree, SqlparserBackend,
    StatementParser, SubqueryNode, TableRef, UpdateNode,
};
