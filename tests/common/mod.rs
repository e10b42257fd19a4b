//! Common test utilities for rust-sqlindex tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rust_sqlindex::structured::StatementParser;
use rust_sqlindex::{index_workspace, path_to_uri, IndexConfig, Workspace};
use tempfile::TempDir;

pub const SCHEMA: &str = "\
CREATE TABLE [dbo].[Employee] (
    [EmployeeId] INT NOT NULL PRIMARY KEY,
    [Name] VARCHAR(50) NOT NULL,
    [DepartmentId] INT NULL
)
GO
CREATE TABLE [dbo].[Department] (
    [Id] INT NOT NULL PRIMARY KEY,
    [Name] VARCHAR(50) NOT NULL
)
GO
";

/// Temporary directory of `.sql` files plus a workspace over it
pub struct TestWorkspace {
    /// Kept to prevent temp directory cleanup until TestWorkspace is dropped
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub workspace: Workspace,
}

impl TestWorkspace {
    /// Workspace without structured parsing.
    pub fn heuristic() -> Self {
        Self::with_config(IndexConfig::default().without_structured_parse())
    }

    pub fn with_config(config: IndexConfig) -> Self {
        let workspace = Workspace::new(config).expect("Failed to create workspace");
        Self::wrap(workspace)
    }

    pub fn with_parser(config: IndexConfig, backend: Arc<dyn StatementParser>) -> Self {
        let workspace = Workspace::with_parser(config, backend).expect("Failed to create workspace");
        Self::wrap(workspace)
    }

    fn wrap(workspace: Workspace) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
            workspace,
        }
    }

    /// Write a file below the root, creating parent directories.
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn uri(&self, relative: &str) -> String {
        path_to_uri(&self.root.join(relative))
    }

    /// Scan the root and wait for corrections to settle.
    pub fn scan(&self) -> rust_sqlindex::WorkspaceScan {
        let scan = index_workspace(&self.root, &self.workspace).expect("Workspace scan failed");
        assert!(
            self.workspace.wait_for_corrections(Duration::from_secs(10)),
            "Corrections did not finish"
        );
        scan
    }

    /// Index in-memory text under `relative` without touching disk.
    pub fn index_text(&self, relative: &str, text: &str) -> rust_sqlindex::IndexOutcome {
        self.workspace.index_file(&self.uri(relative), text)
    }

    pub fn settle(&self) {
        assert!(
            self.workspace.wait_for_corrections(Duration::from_secs(10)),
            "Corrections did not finish"
        );
    }

    /// Sorted reference names at a 0-based position of a file.
    pub fn names_at(&self, relative: &str, line: u32, start_col: u32) -> Vec<String> {
        let mut names: Vec<String> = self
            .workspace
            .index()
            .references_in_file(&self.uri(relative))
            .into_iter()
            .filter(|r| r.line == line && r.start_col == start_col)
            .map(|r| r.name.to_string())
            .collect();
        names.sort();
        names
    }
}

/// Path relative to the workspace root, for readable assertions.
pub fn relative_to(root: &Path, uri: &str) -> String {
    let root_uri = path_to_uri(root);
    uri.strip_prefix(&root_uri)
        .map(|rest| rest.trim_start_matches('/').to_string())
        .unwrap_or_else(|| uri.to_string())
}
