//! Per-statement scope data: aliases, candidate tables and routine-local tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::NormalizedName;

/// What an alias is bound to inside a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasTarget {
    /// A real (or routine-local) table or view
    Table(NormalizedName),
    /// A derived table or CTE; columns qualified by it are never validated
    Subquery,
}

impl AliasTarget {
    pub fn table(&self) -> Option<&NormalizedName> {
        match self {
            AliasTarget::Table(name) => Some(name),
            AliasTarget::Subquery => None,
        }
    }
}

/// `alias (lowercase) -> target` for one statement, or a whole file as fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    entries: HashMap<String, AliasTarget>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an alias to a table unless it is already bound (first definition wins).
    pub fn bind_table(&mut self, alias: &str, table: NormalizedName) {
        self.entries
            .entry(alias.to_lowercase())
            .or_insert(AliasTarget::Table(table));
    }

    /// Bind an alias to the subquery sentinel, replacing a table self-alias of the same name.
    pub fn bind_subquery(&mut self, alias: &str) {
        self.entries.insert(alias.to_lowercase(), AliasTarget::Subquery);
    }

    pub fn get(&self, alias: &str) -> Option<&AliasTarget> {
        self.entries.get(&alias.to_lowercase())
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(&alias.to_lowercase())
    }

    /// True for aliases written in the statement, false for a table's own name.
    pub fn is_explicit_alias(&self, alias: &str) -> bool {
        let key = alias.to_lowercase();
        match self.entries.get(&key) {
            Some(AliasTarget::Table(table)) => table.unqualified() != key,
            Some(AliasTarget::Subquery) => true,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AliasTarget)> {
        self.entries.iter()
    }

    /// Merge `other` into `self`; existing bindings win.
    pub fn extend_missing(&mut self, other: &AliasMap) {
        for (alias, target) in &other.entries {
            self.entries
                .entry(alias.clone())
                .or_insert_with(|| target.clone());
        }
    }
}

/// Tables syntactically reachable from a statement's FROM/JOIN/UPDATE/INSERT/DELETE clauses.
pub type CandidateTableSet = BTreeSet<NormalizedName>;

/// Temp tables and table variables visible in a routine body, keyed with their `#`/`@` prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTableMap {
    tables: BTreeMap<NormalizedName, BTreeSet<NormalizedName>>,
}

impl LocalTableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local table, adding columns to any already known for it.
    pub fn add_columns<I>(&mut self, table: NormalizedName, columns: I)
    where
        I: IntoIterator<Item = NormalizedName>,
    {
        self.tables.entry(table).or_default().extend(columns);
    }

    pub fn columns(&self, table: &str) -> Option<&BTreeSet<NormalizedName>> {
        self.tables.get(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|cols| cols.contains(column))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NormalizedName, &BTreeSet<NormalizedName>)> {
        self.tables.iter()
    }
}
