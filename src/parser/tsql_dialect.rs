//! Dialect selection for the structured parser.
//!
//! Statements are parsed with [`ExtendedTsqlDialect`] by default: a thin wrapper
//! over `MsSqlDialect` that reports itself as MS SQL so sqlparser's
//! `dialect_of!` checks still enable T-SQL parsing paths.

use std::any::TypeId;
use std::fmt;
use std::str::FromStr;

use sqlparser::ast::Statement;
use sqlparser::dialect::{AnsiDialect, Dialect, GenericDialect, MsSqlDialect};
use sqlparser::parser::{Parser, ParserError};

/// Which grammar the structured parser uses. Part of the parse cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DialectOptions {
    #[default]
    TSql,
    Generic,
    Ansi,
}

impl DialectOptions {
    pub fn build(self) -> Box<dyn Dialect + Send + Sync> {
        match self {
            DialectOptions::TSql => Box::new(ExtendedTsqlDialect::new()),
            DialectOptions::Generic => Box::new(GenericDialect {}),
            DialectOptions::Ansi => Box::new(AnsiDialect {}),
        }
    }

    /// Stable name, used in cache keys and on the command line.
    pub fn tag(self) -> &'static str {
        match self {
            DialectOptions::TSql => "tsql",
            DialectOptions::Generic => "generic",
            DialectOptions::Ansi => "ansi",
        }
    }
}

impl fmt::Display for DialectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DialectOptions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tsql" | "mssql" => Ok(DialectOptions::TSql),
            "generic" => Ok(DialectOptions::Generic),
            "ansi" => Ok(DialectOptions::Ansi),
            other => Err(format!("unknown dialect '{other}' (expected tsql, generic or ansi)")),
        }
    }
}

/// Extended T-SQL dialect for sqlparser-rs.
///
/// ```
/// use sqlparser::parser::Parser;
/// use rust_sqlindex::parser::ExtendedTsqlDialect;
///
/// let dialect = ExtendedTsqlDialect::new();
/// let statements = Parser::parse_sql(&dialect, "SELECT [Name] FROM [dbo].[Employee]").unwrap();
/// assert_eq!(statements.len(), 1);
/// ```
#[derive(Debug)]
pub struct ExtendedTsqlDialect {
    base: MsSqlDialect,
}

impl Default for ExtendedTsqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtendedTsqlDialect {
    pub fn new() -> Self {
        Self {
            base: MsSqlDialect {},
        }
    }
}

impl Dialect for ExtendedTsqlDialect {
    // Report as MsSqlDialect so dialect_of!() checks inside sqlparser pass
    fn dialect(&self) -> TypeId {
        TypeId::of::<MsSqlDialect>()
    }

    fn is_identifier_start(&self, ch: char) -> bool {
        self.base.is_identifier_start(ch)
    }

    fn is_identifier_part(&self, ch: char) -> bool {
        self.base.is_identifier_part(ch)
    }

    fn is_delimited_identifier_start(&self, ch: char) -> bool {
        self.base.is_delimited_identifier_start(ch)
    }

    fn parse_statement(&self, parser: &mut Parser) -> Option<Result<Statement, ParserError>> {
        self.base.parse_statement(parser)
    }

    fn convert_type_before_value(&self) -> bool {
        self.base.convert_type_before_value()
    }

    fn supports_eq_alias_assignment(&self) -> bool {
        self.base.supports_eq_alias_assignment()
    }

    fn supports_try_convert(&self) -> bool {
        self.base.supports_try_convert()
    }

    fn supports_boolean_literals(&self) -> bool {
        self.base.supports_boolean_literals()
    }

    fn supports_methods(&self) -> bool {
        self.base.supports_methods()
    }

    fn supports_named_fn_args_with_expr_name(&self) -> bool {
        self.base.supports_named_fn_args_with_expr_name()
    }

    fn supports_start_transaction_modifier(&self) -> bool {
        self.base.supports_start_transaction_modifier()
    }

    fn supports_end_transaction_modifier(&self) -> bool {
        self.base.supports_end_transaction_modifier()
    }

    fn supports_set_stmt_without_operator(&self) -> bool {
        self.base.supports_set_stmt_without_operator()
    }

    fn supports_timestamp_versioning(&self) -> bool {
        self.base.supports_timestamp_versioning()
    }
}
