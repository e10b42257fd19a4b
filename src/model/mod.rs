//! Index data model

mod elements;
mod scope;

pub use elements::*;
pub use scope::{AliasMap, AliasTarget, CandidateTableSet, LocalTableMap};
