//! Index and structured-parse configuration

use std::time::Duration;

use crate::error::SqlIndexError;
use crate::parser::DialectOptions;
use crate::structured::RestartPolicy;

/// Settings for the structured-parse worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConfig {
    /// Number of worker threads; 0 disables structured parsing
    pub pool_size: usize,
    pub job_timeout: Duration,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Statements longer than this (in bytes) are never parsed
    pub max_statement_len: usize,
    pub restart: RestartPolicy,
    pub dialect: DialectOptions,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            job_timeout: Duration::from_secs(2),
            cache_capacity: 512,
            cache_ttl: Duration::from_secs(10 * 60),
            max_statement_len: 20_000,
            restart: RestartPolicy::default(),
            dialect: DialectOptions::default(),
        }
    }
}

/// Settings for indexing files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub max_file_bytes: usize,
    pub max_references_per_file: usize,
    /// Case-insensitive substrings; a path containing any of them is skipped
    pub excluded_path_fragments: Vec<String>,
    /// Glob patterns matched against the whole path
    pub excluded_globs: Vec<String>,
    pub parse: ParseConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 12 * 1024,
            max_references_per_file: 10_000,
            excluded_path_fragments: vec!["deployment".to_string()],
            excluded_globs: Vec::new(),
            parse: ParseConfig::default(),
        }
    }
}

impl IndexConfig {
    pub fn with_max_file_bytes(mut self, bytes: usize) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    pub fn with_max_references(mut self, max: usize) -> Self {
        self.max_references_per_file = max;
        self
    }

    pub fn with_excluded_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.excluded_path_fragments.push(fragment.into());
        self
    }

    pub fn with_excluded_glob(mut self, pattern: impl Into<String>) -> Self {
        self.excluded_globs.push(pattern.into());
        self
    }

    pub fn with_parse(mut self, parse: ParseConfig) -> Self {
        self.parse = parse;
        self
    }

    /// Disable structured parsing; ambiguous references stay provisional.
    pub fn without_structured_parse(mut self) -> Self {
        self.parse.pool_size = 0;
        self
    }

    /// Reject settings that cannot work and compile exclusion globs.
    pub fn validate(&self) -> Result<Vec<glob::Pattern>, SqlIndexError> {
        if self.max_file_bytes == 0 {
            return Err(SqlIndexError::InvalidConfig {
                message: "max_file_bytes must be greater than zero".to_string(),
            });
        }
        if self.max_references_per_file == 0 {
            return Err(SqlIndexError::InvalidConfig {
                message: "max_references_per_file must be greater than zero".to_string(),
            });
        }
        if self.parse.pool_size > 0 && self.parse.job_timeout.is_zero() {
            return Err(SqlIndexError::InvalidConfig {
                message: "parse job timeout must be greater than zero".to_string(),
            });
        }
        if self.parse.restart.base_delay > self.parse.restart.max_delay {
            return Err(SqlIndexError::InvalidConfig {
                message: format!(
                    "restart base delay {:?} exceeds max delay {:?}",
                    self.parse.restart.base_delay, self.parse.restart.max_delay
                ),
            });
        }
        self.excluded_globs
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|source| SqlIndexError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }
}
