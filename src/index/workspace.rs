//! Indexing orchestration.
//!
//! A [`Workspace`] owns the symbol index, the structured-parse pool and a small
//! rayon pool that runs disambiguation jobs. `index_file` is synchronous: it
//! publishes the heuristic references before returning and only then queues
//! one correction job per ambiguous reference.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use tracing::{debug, trace};

use super::symbol_index::{CorrectionOutcome, IndexStats, SymbolIndex};
use crate::config::IndexConfig;
use crate::error::SqlIndexError;
use crate::model::{AliasMap, Location, ReferenceDef, SourceSpan, SymbolDef};
use crate::parser::{
    extract_definitions, resolve_statement_scope, AmbiguousReference, DialectOptions, FileScopes,
    LineIndex, StatementScope,
};
use crate::structured::{
    disambiguate, Disambiguation, ParsePool, PoolStats, SqlTree, SqlparserBackend, StatementParser,
};
use crate::util::{contains_ci, ends_with_ci};

/// Below this many files, definition extraction runs sequentially.
const PARALLEL_THRESHOLD: usize = 8;

/// Why `index_file` left a file out of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotSql,
    TooLarge { bytes: usize, limit: usize },
    Excluded { pattern: String },
}

/// Summary of one synchronous indexing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedFile {
    pub generation: u64,
    pub symbols: usize,
    pub references: usize,
    /// Ambiguous references queued for disambiguation (or left provisional)
    pub ambiguities: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed(IndexedFile),
    Skipped(SkipReason),
}

impl IndexOutcome {
    pub fn is_indexed(&self) -> bool {
        matches!(self, IndexOutcome::Indexed(_))
    }
}

/// Correction counters plus index and pool snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceStats {
    pub index: IndexStats,
    pub pool: Option<PoolStats>,
    pub scheduled_corrections: u64,
    pub applied_corrections: u64,
    pub stale_corrections: u64,
    pub rejected_corrections: u64,
    pub inconclusive_corrections: u64,
}

#[derive(Debug, Default)]
struct CorrectionCounters {
    scheduled: AtomicU64,
    applied: AtomicU64,
    stale: AtomicU64,
    rejected: AtomicU64,
    inconclusive: AtomicU64,
}

/// Outstanding correction jobs.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Decrements the pending count however the job ends.
struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// One ambiguous reference and everything needed to settle it later.
struct CorrectionJob {
    uri: String,
    generation: u64,
    dialect: DialectOptions,
    timeout: Duration,
    ambiguity: AmbiguousReference,
}

/// Everything a correction job needs, shared with the rayon workers.
struct CorrectionContext {
    index: Arc<SymbolIndex>,
    parser: Arc<ParsePool>,
    counters: CorrectionCounters,
    pending: Arc<Pending>,
}

impl CorrectionContext {
    fn run(&self, job: CorrectionJob) {
        let ambiguity = &job.ambiguity;
        if self.index.generation(&job.uri) != Some(job.generation) {
            trace!(uri = %job.uri, "Skipping disambiguation for a superseded file version");
            self.counters.stale.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let tree = self
            .parser
            .submit(&ambiguity.statement_text, job.dialect, job.timeout);
        let decision = disambiguate(
            tree.as_deref(),
            &ambiguity.column,
            &ambiguity.aliases,
            &ambiguity.candidates,
        );

        match decision {
            Disambiguation::Accepted(keep) => {
                let span = SourceSpan {
                    line: ambiguity.line,
                    start_col: ambiguity.start_col,
                    end_col: ambiguity.end_col,
                };
                match self.index.apply_correction(
                    &job.uri,
                    job.generation,
                    span,
                    &ambiguity.column,
                    &keep,
                    &ambiguity.provisional,
                ) {
                    CorrectionOutcome::Applied { retracted } => {
                        trace!(uri = %job.uri, column = %ambiguity.column, %keep, retracted, "Applied disambiguation");
                        self.counters.applied.fetch_add(1, Ordering::Relaxed);
                    }
                    CorrectionOutcome::Stale => {
                        self.counters.stale.fetch_add(1, Ordering::Relaxed);
                    }
                    CorrectionOutcome::Unmatched => {
                        debug!(
                            uri = %job.uri,
                            line = ambiguity.line,
                            column = %ambiguity.column,
                            %keep,
                            "Structured parse named a table with no provisional reference here"
                        );
                        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Disambiguation::Rejected(owner) => {
                debug!(
                    uri = %job.uri,
                    line = ambiguity.line,
                    column = %ambiguity.column,
                    %owner,
                    "Structured parse named a table outside the candidate set"
                );
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Disambiguation::Inconclusive => {
                self.counters.inconclusive.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// A session's index together with its structured-parse machinery.
pub struct Workspace {
    config: IndexConfig,
    excluded_globs: Vec<glob::Pattern>,
    index: Arc<SymbolIndex>,
    corrections: Option<Arc<CorrectionContext>>,
    correction_pool: rayon::ThreadPool,
    pending: Arc<Pending>,
}

impl Workspace {
    pub fn new(config: IndexConfig) -> Result<Self, SqlIndexError> {
        Self::with_parser(config, Arc::new(SqlparserBackend))
    }

    /// Build a workspace whose structured parses go through `backend`.
    pub fn with_parser(
        config: IndexConfig,
        backend: Arc<dyn StatementParser>,
    ) -> Result<Self, SqlIndexError> {
        let excluded_globs = config.validate()?;
        let index = Arc::new(SymbolIndex::new());
        let pending = Arc::new(Pending::default());

        let corrections = if config.parse.pool_size > 0 {
            let parser = Arc::new(ParsePool::new(&config.parse, backend)?);
            Some(Arc::new(CorrectionContext {
                index: Arc::clone(&index),
                parser,
                counters: CorrectionCounters::default(),
                pending: Arc::clone(&pending),
            }))
        } else {
            debug!("Structured parsing disabled");
            None
        };

        let correction_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parse.pool_size.max(1))
            .thread_name(|i| format!("sql-correct-{i}"))
            .build()
            .map_err(|source| SqlIndexError::CorrectionPoolError { source })?;

        Ok(Self {
            config,
            excluded_globs,
            index,
            corrections,
            correction_pool,
            pending,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn index(&self) -> &SymbolIndex {
        &self.index
    }

    /// Why `uri` would be skipped, if it would.
    pub fn skip_reason(&self, uri: &str, bytes: usize) -> Option<SkipReason> {
        if !ends_with_ci(uri, ".sql") {
            return Some(SkipReason::NotSql);
        }
        if bytes > self.config.max_file_bytes {
            return Some(SkipReason::TooLarge {
                bytes,
                limit: self.config.max_file_bytes,
            });
        }
        if let Some(fragment) = self
            .config
            .excluded_path_fragments
            .iter()
            .find(|fragment| contains_ci(uri, fragment))
        {
            return Some(SkipReason::Excluded {
                pattern: fragment.clone(),
            });
        }
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        self.excluded_globs
            .iter()
            .find(|pattern| pattern.matches(path))
            .map(|pattern| SkipReason::Excluded {
                pattern: pattern.as_str().to_string(),
            })
    }

    /// Reindex one file and queue disambiguation for its ambiguous references.
    ///
    /// Skipping a file that was indexed before removes its old contributions.
    pub fn index_file(&self, uri: &str, text: &str) -> IndexOutcome {
        if let Some(reason) = self.skip_reason(uri, text.len()) {
            debug!(uri, ?reason, "Skipping file");
            if self.index.generation(uri).is_some() {
                self.index.remove_file(uri);
            }
            return IndexOutcome::Skipped(reason);
        }

        let symbols = extract_definitions(uri, text);
        let scopes = FileScopes::analyze(text);
        let published = self.index.replace_file(
            uri,
            text,
            symbols,
            &scopes,
            self.config.max_references_per_file,
        );

        let summary = IndexedFile {
            generation: published.generation,
            symbols: published.symbols,
            references: published.extracted.references.len(),
            ambiguities: published.extracted.ambiguities.len(),
            truncated: published.extracted.truncated,
        };
        debug!(
            uri,
            generation = summary.generation,
            symbols = summary.symbols,
            references = summary.references,
            ambiguities = summary.ambiguities,
            "Indexed file"
        );

        for ambiguity in published.extracted.ambiguities {
            self.schedule_correction(CorrectionJob {
                uri: uri.to_string(),
                generation: published.generation,
                dialect: self.config.parse.dialect,
                timeout: self.config.parse.job_timeout,
                ambiguity,
            });
        }
        IndexOutcome::Indexed(summary)
    }

    /// Index several files so every reference pass sees every file's columns.
    ///
    /// Definitions of all eligible files are published first; the full pass
    /// for each file follows in input order.
    pub fn index_batch(&self, files: &[(String, String)]) -> Vec<IndexOutcome> {
        let eligible: Vec<&(String, String)> = files
            .iter()
            .filter(|(uri, text)| self.skip_reason(uri, text.len()).is_none())
            .collect();

        let definitions: Vec<(&str, Vec<SymbolDef>)> = if eligible.len() >= PARALLEL_THRESHOLD {
            eligible
                .par_iter()
                .map(|(uri, text)| (uri.as_str(), extract_definitions(uri, text)))
                .collect()
        } else {
            eligible
                .iter()
                .map(|(uri, text)| (uri.as_str(), extract_definitions(uri, text)))
                .collect()
        };
        for (uri, symbols) in definitions {
            self.index.publish_definitions(uri, symbols);
        }

        files
            .iter()
            .map(|(uri, text)| self.index_file(uri, text))
            .collect()
    }

    /// Remove all definitions and references contributed by `uri`.
    pub fn deindex_file(&self, uri: &str) {
        self.index.remove_file(uri);
    }

    fn schedule_correction(&self, job: CorrectionJob) {
        let Some(context) = &self.corrections else {
            return;
        };
        context.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        self.pending.begin();
        let context = Arc::clone(context);
        self.correction_pool.spawn(move || {
            let _done = PendingGuard(Arc::clone(&context.pending));
            context.run(job);
        });
    }

    /// Block until every queued correction has finished or `timeout` passes.
    ///
    /// Returns `true` when nothing is left pending.
    pub fn wait_for_corrections(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            if self.pending.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    pub fn get_references(&self, name: &str) -> Vec<ReferenceDef> {
        self.index.get_references(name)
    }

    pub fn get_references_in_file(&self, name: &str, uri: &str) -> Vec<ReferenceDef> {
        self.index.get_references_in_file(name, uri)
    }

    pub fn find_column_locations(&self, table: &str, column: &str) -> Vec<Location> {
        self.index.find_column_locations(table, column)
    }

    pub fn find_any_locations(&self, word: &str) -> Vec<Location> {
        self.index.find_any_locations(word)
    }

    pub fn find_definitions(&self, name: &str) -> Vec<SymbolDef> {
        self.index.find_definitions(name)
    }

    pub fn get_symbols_in_file(&self, uri: &str) -> Vec<SymbolDef> {
        self.index.get_symbols_in_file(uri)
    }

    pub fn aliases_for_file(&self, uri: &str) -> Option<AliasMap> {
        self.index.aliases_for_file(uri)
    }

    /// Scope of the statement enclosing a 0-based line/character position.
    pub fn resolve_statement_scope(&self, text: &str, line: usize, character: usize) -> StatementScope {
        let offset = LineIndex::new(text).offset(line, character);
        resolve_statement_scope(text, offset)
    }

    /// Exact parse of one statement; `None` when unavailable, failed or timed out.
    pub fn submit_parse(
        &self,
        statement: &str,
        dialect: DialectOptions,
        timeout: Duration,
    ) -> Option<Arc<SqlTree>> {
        self.corrections
            .as_ref()
            .and_then(|context| context.parser.submit(statement, dialect, timeout))
    }

    /// True while structured parsing can serve requests.
    pub fn is_parse_ready(&self) -> bool {
        self.corrections
            .as_ref()
            .is_some_and(|context| context.parser.is_ready())
    }

    pub fn stats(&self) -> WorkspaceStats {
        let mut stats = WorkspaceStats {
            index: self.index.stats(),
            ..WorkspaceStats::default()
        };
        if let Some(context) = &self.corrections {
            let counters = &context.counters;
            stats.pool = Some(context.parser.stats());
            stats.scheduled_corrections = counters.scheduled.load(Ordering::Relaxed);
            stats.applied_corrections = counters.applied.load(Ordering::Relaxed);
            stats.stale_corrections = counters.stale.load(Ordering::Relaxed);
            stats.rejected_corrections = counters.rejected.load(Ordering::Relaxed);
            stats.inconclusive_corrections = counters.inconclusive.load(Ordering::Relaxed);
        }
        stats
    }

    /// Stop the parse workers; queued corrections finish as inconclusive.
    pub fn shutdown(&self) {
        if let Some(context) = &self.corrections {
            context.parser.shutdown();
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.shutdown();
    }
}
