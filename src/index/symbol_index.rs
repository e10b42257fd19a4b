//! The shared symbol index.
//!
//! All state lives behind one `parking_lot::RwLock`. A file's contributions are
//! replaced as a unit under the write lock (purge, then publish), so readers
//! never observe a half-indexed file. Every replacement bumps the file's
//! generation; asynchronous corrections carry the generation they were
//! computed against and are dropped if it has moved on.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::RwLock;
use tracing::trace;

use super::column_registry::ColumnRegistry;
use crate::model::{
    AliasMap, Location, NormalizedName, ReferenceDef, SourceSpan, SymbolDef,
};
use crate::parser::{extract_references, ExtractedReferences, FileScopes};

/// Result of applying an asynchronous correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// The file is unchanged since submission; `retracted` references were removed
    Applied { retracted: usize },
    /// The file was reindexed or removed after the job was submitted
    Stale,
    /// `keep` has no provisional reference at the span; nothing was retracted
    Unmatched,
}

/// Counts over the whole index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    pub symbols: usize,
    pub tables_with_columns: usize,
    pub reference_names: usize,
    pub references: usize,
}

/// What one call to [`SymbolIndex::replace_file`] published.
#[derive(Debug, Clone)]
pub struct PublishedFile {
    pub generation: u64,
    pub symbols: usize,
    pub extracted: ExtractedReferences,
}

#[derive(Debug, Default)]
struct IndexState {
    definitions_by_file: HashMap<String, Vec<SymbolDef>>,
    /// name -> files defining it
    definitions_by_name: HashMap<NormalizedName, BTreeSet<String>>,
    /// name -> uri -> references
    references: HashMap<NormalizedName, HashMap<String, Vec<ReferenceDef>>>,
    /// uri -> names it contributed references to
    reference_names_by_file: HashMap<String, HashSet<NormalizedName>>,
    columns: ColumnRegistry,
    aliases_by_file: HashMap<String, AliasMap>,
    generations: HashMap<String, u64>,
    next_generation: u64,
}

impl IndexState {
    fn purge(&mut self, uri: &str) {
        if let Some(symbols) = self.definitions_by_file.remove(uri) {
            for symbol in symbols {
                if let Some(files) = self.definitions_by_name.get_mut(&symbol.name) {
                    files.remove(uri);
                    if files.is_empty() {
                        self.definitions_by_name.remove(&symbol.name);
                    }
                }
            }
        }
        self.columns.remove_file(uri);

        if let Some(names) = self.reference_names_by_file.remove(uri) {
            for name in names {
                if let Some(by_file) = self.references.get_mut(&name) {
                    by_file.remove(uri);
                    if by_file.is_empty() {
                        self.references.remove(&name);
                    }
                }
            }
        }
        self.aliases_by_file.remove(uri);
    }

    fn publish_definitions(&mut self, uri: &str, symbols: Vec<SymbolDef>) {
        self.columns.add_file(uri, &symbols);
        for symbol in &symbols {
            self.definitions_by_name
                .entry(symbol.name.clone())
                .or_default()
                .insert(uri.to_string());
        }
        self.definitions_by_file.insert(uri.to_string(), symbols);
    }

    fn publish_references(&mut self, uri: &str, references: &[ReferenceDef]) {
        let names = self
            .reference_names_by_file
            .entry(uri.to_string())
            .or_default();
        for reference in references {
            names.insert(reference.name.clone());
            self.references
                .entry(reference.name.clone())
                .or_default()
                .entry(uri.to_string())
                .or_default()
                .push(reference.clone());
        }
    }

    fn bump_generation(&mut self, uri: &str) -> u64 {
        self.next_generation += 1;
        self.generations.insert(uri.to_string(), self.next_generation);
        self.next_generation
    }

    fn symbols(&self) -> impl Iterator<Item = &SymbolDef> {
        self.definitions_by_file.values().flatten()
    }

    fn symbols_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SymbolDef> + 'a {
        self.definitions_by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|uri| self.definitions_by_file.get(uri))
            .flatten()
            .filter(move |symbol| symbol.name.as_str() == name)
    }
}

/// Workspace-wide definitions, references, columns and aliases.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    state: RwLock<IndexState>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace only the definitions of `uri`, dropping its previous references.
    ///
    /// Used for the first phase of a workspace scan, so the reference pass of
    /// every file sees every table's columns.
    pub fn publish_definitions(&self, uri: &str, symbols: Vec<SymbolDef>) -> u64 {
        let mut state = self.state.write();
        state.purge(uri);
        state.publish_definitions(uri, symbols);
        state.bump_generation(uri)
    }

    /// Purge everything `uri` contributed and publish a fresh first version.
    ///
    /// References are extracted under the write lock against the column
    /// catalog as it stands after this file's own definitions are in.
    pub fn replace_file(
        &self,
        uri: &str,
        text: &str,
        symbols: Vec<SymbolDef>,
        scopes: &FileScopes,
        max_references: usize,
    ) -> PublishedFile {
        let mut state = self.state.write();
        state.purge(uri);
        let symbol_count = symbols.len();
        state.publish_definitions(uri, symbols);

        let extracted = extract_references(uri, text, scopes, &state.columns, max_references);
        state.publish_references(uri, &extracted.references);
        state
            .aliases_by_file
            .insert(uri.to_string(), scopes.file_aliases().clone());
        let generation = state.bump_generation(uri);

        PublishedFile {
            generation,
            symbols: symbol_count,
            extracted,
        }
    }

    /// Remove every definition and reference contributed by `uri`.
    pub fn remove_file(&self, uri: &str) {
        let mut state = self.state.write();
        state.purge(uri);
        state.generations.remove(uri);
    }

    /// Retract the provisional references at `span` that disagree with `keep`.
    ///
    /// Only `<table>.<column>` references for tables in `provisional` are touched,
    /// and only at exactly `span`; applying the same correction twice is a no-op.
    /// A `keep` outside `provisional` would empty the span, so it retracts nothing.
    pub fn apply_correction(
        &self,
        uri: &str,
        generation: u64,
        span: SourceSpan,
        column: &NormalizedName,
        keep: &NormalizedName,
        provisional: &[NormalizedName],
    ) -> CorrectionOutcome {
        let mut state = self.state.write();
        if state.generations.get(uri) != Some(&generation) {
            trace!(uri, generation, "Dropping correction for a superseded file version");
            return CorrectionOutcome::Stale;
        }
        if !provisional.contains(keep) {
            return CorrectionOutcome::Unmatched;
        }

        let mut retracted = 0;
        for table in provisional.iter().filter(|table| *table != keep) {
            let name = NormalizedName::qualified(table, column);
            let Some(by_file) = state.references.get_mut(&name) else {
                continue;
            };
            if let Some(references) = by_file.get_mut(uri) {
                let before = references.len();
                references.retain(|r| r.position() != span);
                retracted += before - references.len();
                if references.is_empty() {
                    by_file.remove(uri);
                }
            }
            if by_file.is_empty() {
                state.references.remove(&name);
            }
        }
        CorrectionOutcome::Applied { retracted }
    }

    /// All references to a normalized name across all indexed files.
    pub fn get_references(&self, name: &str) -> Vec<ReferenceDef> {
        let key = NormalizedName::new(name);
        let state = self.state.read();
        let mut references: Vec<ReferenceDef> = state
            .references
            .get(&key)
            .into_iter()
            .flat_map(|by_file| by_file.values().flatten().cloned())
            .collect();
        references.sort_by(|a, b| a.location().cmp(&b.location()));
        references
    }

    pub fn get_references_in_file(&self, name: &str, uri: &str) -> Vec<ReferenceDef> {
        let key = NormalizedName::new(name);
        let state = self.state.read();
        let mut references = state
            .references
            .get(&key)
            .and_then(|by_file| by_file.get(uri))
            .cloned()
            .unwrap_or_default();
        references.sort_by_key(|r| r.position());
        references
    }

    /// Every reference in `uri`, in position order.
    pub fn references_in_file(&self, uri: &str) -> Vec<ReferenceDef> {
        let state = self.state.read();
        let mut references: Vec<ReferenceDef> = state
            .reference_names_by_file
            .get(uri)
            .into_iter()
            .flatten()
            .filter_map(|name| state.references.get(name)?.get(uri))
            .flatten()
            .cloned()
            .collect();
        references.sort_by(|a, b| (a.position(), &a.name).cmp(&(b.position(), &b.name)));
        references
    }

    /// Definition sites of `column` in every definition of `table`.
    pub fn find_column_locations(&self, table: &str, column: &str) -> Vec<Location> {
        let table = NormalizedName::new(table);
        let column = NormalizedName::new(column);
        let state = self.state.read();
        let mut locations: Vec<Location> = state
            .symbols_named(table.as_str())
            .filter_map(|symbol| {
                symbol
                    .column(column.as_str())
                    .map(|c| symbol.column_location(c))
            })
            .collect();
        locations.sort();
        locations
    }

    /// Fallback lookup by bare token: objects whose (unqualified) name is `word`,
    /// then columns named `word` in any object.
    pub fn find_any_locations(&self, word: &str) -> Vec<Location> {
        let key = NormalizedName::new(word);
        if key.is_empty() {
            return Vec::new();
        }
        let state = self.state.read();
        let mut objects: Vec<Location> = state
            .symbols()
            .filter(|s| s.name == key || s.name.unqualified() == key.as_str())
            .map(SymbolDef::location)
            .collect();
        let mut columns: Vec<Location> = state
            .symbols()
            .flat_map(|s| {
                s.columns
                    .iter()
                    .filter(|c| c.name == key)
                    .map(move |c| s.column_location(c))
            })
            .collect();
        objects.sort();
        columns.sort();
        objects.extend(columns);
        objects.dedup();
        objects
    }

    /// Definitions of tables, views, routines and types named `name`.
    pub fn find_definitions(&self, name: &str) -> Vec<SymbolDef> {
        let key = NormalizedName::new(name);
        let state = self.state.read();
        let mut symbols: Vec<SymbolDef> = state.symbols_named(key.as_str()).cloned().collect();
        symbols.sort_by(|a, b| a.location().cmp(&b.location()));
        symbols
    }

    pub fn get_symbols_in_file(&self, uri: &str) -> Vec<SymbolDef> {
        self.state
            .read()
            .definitions_by_file
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }

    /// Columns of the latest definition of `table`, in declaration order.
    pub fn columns_for_table(&self, table: &str) -> Vec<NormalizedName> {
        let key = NormalizedName::new(table);
        self.state
            .read()
            .columns
            .columns(key.as_str())
            .map(|cols| cols.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tables whose latest definition declares `column`.
    pub fn tables_with_column(&self, column: &str) -> Vec<NormalizedName> {
        let key = NormalizedName::new(column);
        self.state
            .read()
            .columns
            .tables_with_column(key.as_str())
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn aliases_for_file(&self, uri: &str) -> Option<AliasMap> {
        self.state.read().aliases_by_file.get(uri).cloned()
    }

    /// Current generation of `uri`; `None` when the file is not indexed.
    pub fn generation(&self, uri: &str) -> Option<u64> {
        self.state.read().generations.get(uri).copied()
    }

    pub fn indexed_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.state.read().generations.keys().cloned().collect();
        files.sort();
        files
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            files: state.generations.len(),
            symbols: state.symbols().count(),
            tables_with_columns: state.columns.table_count(),
            reference_names: state.references.len(),
            references: state
                .references
                .values()
                .flat_map(|by_file| by_file.values())
                .map(Vec::len)
                .sum(),
        }
    }
}
