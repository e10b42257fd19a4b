//! Symbol index and indexing orchestration

mod column_registry;
mod symbol_index;
mod workspace;

pub use column_registry::ColumnRegistry;
pub use symbol_index::{CorrectionOutcome, IndexStats, PublishedFile, SymbolIndex};
pub use workspace::{IndexOutcome, IndexedFile, SkipReason, Workspace, WorkspaceStats};
