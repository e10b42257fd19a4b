//! Error types for rust-sqlindex

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while configuring or feeding the index.
///
/// Malformed SQL is never an error: extractors degrade to partial results
/// and the structured parser reports failure as `None`.
#[derive(Error, Debug)]
pub enum SqlIndexError {
    #[error("Failed to read SQL file: {path}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan workspace directory: {path}")]
    WorkspaceScanError {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Invalid index configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid exclusion pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to spawn parse worker for slot {slot}")]
    WorkerSpawnError {
        slot: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build correction thread pool")]
    CorrectionPoolError {
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
}

/// Why a single structured parse produced no tree.
///
/// Stays inside the parse subsystem; callers only ever see `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("Statement did not parse: {0}")]
    Syntax(String),

    #[error("Parse worker panicked: {0}")]
    Panicked(String),
}
