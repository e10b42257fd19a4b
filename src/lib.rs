//! rust-sqlindex: a workspace symbol and reference index for T-SQL
//!
//! Definitions and references are extracted from `.sql` files with fast
//! heuristic scanners and published to an in-memory [`SymbolIndex`]. Bare
//! columns that more than one in-scope table could own are recorded for every
//! candidate and later narrowed by an exact parse on a supervised worker pool.

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod parser;
pub mod structured;
mod util;

use std::path::{Path, PathBuf};

use anyhow::Result;
use encoding_rs::WINDOWS_1252;
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

pub use config::{IndexConfig, ParseConfig};
pub use error::{ParseFailure, SqlIndexError};
pub use index::{IndexOutcome, IndexedFile, SkipReason, SymbolIndex, Workspace, WorkspaceStats};
pub use model::{Location, NormalizedName, ReferenceDef, ReferenceKind, SymbolDef, SymbolKind};
pub use parser::{normalize_identifier, normalize_name, DialectOptions, StatementScope};

/// Minimum number of files to benefit from parallel reading.
const PARALLEL_THRESHOLD: usize = 8;

/// Totals of one [`index_workspace`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceScan {
    pub indexed: usize,
    pub skipped: usize,
    pub ambiguities: usize,
    pub truncated: usize,
}

/// URI used as the index key for a file on disk.
pub fn path_to_uri(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    if path.starts_with('/') {
        format!("file://{path}")
    } else {
        format!("file:///{path}")
    }
}

/// Read a SQL file, falling back to Windows-1252 when it is not UTF-8.
pub fn read_sql_file(path: &Path) -> Result<String, SqlIndexError> {
    let bytes = std::fs::read(path).map_err(|source| SqlIndexError::FileReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let content = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            let bytes = err.into_bytes();
            let (decoded, _, had_errors) = WINDOWS_1252.decode(&bytes);
            if had_errors {
                return Err(SqlIndexError::FileReadError {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "File contains invalid characters",
                    ),
                });
            }
            decoded.into_owned()
        }
    };

    match content.strip_prefix('\u{FEFF}') {
        Some(stripped) => Ok(stripped.to_string()),
        None => Ok(content),
    }
}

/// Index every `.sql` file below `root`.
///
/// Files the workspace would skip by name or size are not read. Definitions
/// from every file are published before any file's references are resolved.
pub fn index_workspace(root: &Path, workspace: &Workspace) -> Result<WorkspaceScan> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut scan = WorkspaceScan::default();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| SqlIndexError::WorkspaceScanError {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let uri = path_to_uri(path);
        let bytes = entry
            .metadata()
            .map(|meta| usize::try_from(meta.len()).unwrap_or(usize::MAX))
            .unwrap_or(0);
        match workspace.skip_reason(&uri, bytes) {
            Some(SkipReason::NotSql) => {}
            Some(reason) => {
                debug!(uri, ?reason, "Skipping file");
                scan.skipped += 1;
            }
            None => candidates.push(path.to_path_buf()),
        }
    }

    let read = |path: &PathBuf| -> Result<(String, String), SqlIndexError> {
        Ok((path_to_uri(path), read_sql_file(path)?))
    };
    let files: Vec<(String, String)> = if candidates.len() >= PARALLEL_THRESHOLD {
        candidates
            .par_iter()
            .map(read)
            .collect::<Result<_, _>>()?
    } else {
        candidates
            .iter()
            .map(read)
            .collect::<Result<_, _>>()?
    };

    for outcome in workspace.index_batch(&files) {
        match outcome {
            IndexOutcome::Indexed(file) => {
                scan.indexed += 1;
                scan.ambiguities += file.ambiguities;
                scan.truncated += usize::from(file.truncated);
            }
            IndexOutcome::Skipped(_) => scan.skipped += 1,
        }
    }

    info!(
        root = %root.display(),
        indexed = scan.indexed,
        skipped = scan.skipped,
        "Workspace indexed"
    );
    Ok(scan)
}
