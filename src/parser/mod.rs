//! T-SQL scanning: definitions, references and statement scopes

mod definitions;
mod identifier_utils;
mod keywords;
mod references;
mod scope;
pub(crate) mod text;
mod tsql_dialect;

pub use definitions::extract_definitions;
pub use identifier_utils::{
    display_name, is_bracketed, is_delimited, is_double_quoted, is_local_table_name,
    normalize_identifier, normalize_name, unqualified_part,
};
pub use keywords::{is_sql_keyword, is_statement_start_keyword, is_type_keyword};
pub use references::{extract_references, AmbiguousReference, ColumnCatalog, ExtractedReferences};
pub use scope::{
    resolve_statement_scope, FileScopes, ParameterToken, RoutineKind, RoutineSpan, StatementScope,
};
pub use text::{blank_comments, blank_comments_and_strings, LineIndex};
pub use tsql_dialect::{DialectOptions, ExtendedTsqlDialect};
