//! Column ownership from structured parse trees.
//!
//! Given a lowered [`SqlTree`] and a column name, find which table the
//! statement attributes the column to, then check that answer against the
//! candidate tables the heuristic pass saw. An answer naming a table outside
//! that set is rejected rather than trusted.

use std::collections::HashMap;

use super::tree::{ColumnRef, SqlNode, SqlTree};
use crate::model::{AliasMap, AliasTarget, CandidateTableSet, NormalizedName};

/// Result of narrowing one ambiguous reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disambiguation {
    /// The owner is one of the original candidates
    Accepted(NormalizedName),
    /// The tree named an owner outside the candidate set
    Rejected(NormalizedName),
    /// No tree, no owner found, or conflicting owners
    Inconclusive,
}

/// An owner as the tree states it, before statement-level alias resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnOwner {
    Table(NormalizedName),
    /// A qualifier the enclosing query level does not bind (e.g. a correlated outer alias)
    Alias(String),
    /// A derived table or CTE; never a candidate
    Subquery,
}

#[derive(Debug, Clone)]
enum LocalBinding {
    Table(NormalizedName),
    Subquery,
}

/// Narrow `column` to one of `candidates` using `tree`.
///
/// `aliases` is the statement's alias map from the scope pass; alias owners are
/// resolved through it before the acceptance check.
pub fn disambiguate(
    tree: Option<&SqlTree>,
    column: &NormalizedName,
    aliases: &AliasMap,
    candidates: &CandidateTableSet,
) -> Disambiguation {
    let Some(tree) = tree else {
        return Disambiguation::Inconclusive;
    };

    let mut resolved: Vec<NormalizedName> = Vec::new();
    for owner in column_owners(tree, column) {
        let table = match owner {
            ColumnOwner::Table(name) => name,
            ColumnOwner::Alias(alias) => match aliases.get(&alias) {
                Some(AliasTarget::Table(name)) => name.clone(),
                Some(AliasTarget::Subquery) => continue,
                None => NormalizedName::new(&alias),
            },
            ColumnOwner::Subquery => continue,
        };
        if !resolved.contains(&table) {
            resolved.push(table);
        }
    }

    match resolved.as_slice() {
        [owner] => accept(owner, candidates),
        _ => Disambiguation::Inconclusive,
    }
}

fn accept(owner: &NormalizedName, candidates: &CandidateTableSet) -> Disambiguation {
    if candidates.contains(owner) {
        return Disambiguation::Accepted(owner.clone());
    }
    // `Employee` in the tree vs `hr.employee` in the candidates
    let mut by_name = candidates
        .iter()
        .filter(|candidate| candidate.unqualified() == owner.unqualified());
    match (by_name.next(), by_name.next()) {
        (Some(only), None) => Disambiguation::Accepted(only.clone()),
        _ => Disambiguation::Rejected(owner.clone()),
    }
}

/// Every owner the tree attributes `column` to, in walk order, deduplicated.
pub fn column_owners(tree: &SqlTree, column: &NormalizedName) -> Vec<ColumnOwner> {
    let mut owners = Vec::new();
    for statement in &tree.statements {
        walk(statement, column, &mut owners);
    }
    owners
}

fn walk(node: &SqlNode, column: &NormalizedName, owners: &mut Vec<ColumnOwner>) {
    let mut push = |owner: ColumnOwner| {
        if !owners.contains(&owner) {
            owners.push(owner);
        }
    };

    match node {
        SqlNode::Select(select) => {
            let scope = local_scope(&select.from);
            let sole_table = match select.from.as_slice() {
                [SqlNode::TableRef(table)] => Some(&table.name),
                _ => None,
            };
            for reference in matching(&select.columns, column) {
                match &reference.qualifier {
                    Some(qualifier) => push(qualified_owner(&scope, qualifier)),
                    None => {
                        if let Some(table) = sole_table {
                            push(ColumnOwner::Table(table.clone()));
                        }
                    }
                }
            }
        }
        SqlNode::Update(_) | SqlNode::Delete(_) => {
            if let Some(target) = node.target() {
                if matching(node.column_refs(), column).next().is_some() {
                    push(ColumnOwner::Table(target.name.clone()));
                }
            }
        }
        SqlNode::Insert(insert) => {
            if matching(&insert.columns, column).next().is_some() {
                push(ColumnOwner::Table(insert.target.name.clone()));
            }
        }
        SqlNode::TableRef(_) | SqlNode::ColumnRef(_) | SqlNode::Subquery(_) => {}
    }

    for child in node.children() {
        walk(child, column, owners);
    }
}

fn matching<'a>(
    columns: &'a [ColumnRef],
    column: &'a NormalizedName,
) -> impl Iterator<Item = &'a ColumnRef> + 'a {
    columns.iter().filter(move |reference| reference.name.unqualified() == column.unqualified())
}

/// Aliases and table names bound by one query level's FROM items.
fn local_scope(from: &[SqlNode]) -> HashMap<String, LocalBinding> {
    let mut scope = HashMap::new();
    for item in from {
        match item {
            SqlNode::TableRef(table) => {
                let binding = LocalBinding::Table(table.name.clone());
                if let Some(alias) = &table.alias {
                    scope.insert(alias.to_lowercase(), binding.clone());
                }
                scope
                    .entry(table.name.unqualified().to_string())
                    .or_insert_with(|| binding.clone());
                scope.entry(table.name.as_str().to_string()).or_insert(binding);
            }
            SqlNode::Subquery(subquery) => {
                if let Some(alias) = &subquery.alias {
                    scope.insert(alias.to_lowercase(), LocalBinding::Subquery);
                }
            }
            _ => {}
        }
    }
    scope
}

fn qualified_owner(scope: &HashMap<String, LocalBinding>, qualifier: &str) -> ColumnOwner {
    let binding = scope
        .get(&qualifier.to_lowercase())
        .or_else(|| scope.get(NormalizedName::new(qualifier).as_str()));
    match binding {
        Some(LocalBinding::Table(name)) => ColumnOwner::Table(name.clone()),
        Some(LocalBinding::Subquery) => ColumnOwner::Subquery,
        None => ColumnOwner::Alias(qualifier.to_string()),
    }
}
