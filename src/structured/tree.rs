//! Structured parse trees.
//!
//! sqlparser's AST has many shapes for "a table" or "a column". Parse results
//! are lowered once, at the parser boundary, into the closed [`SqlNode`] union
//! that the disambiguator walks.

use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};

use sqlparser::ast::{
    AssignmentTarget, Expr, Ident, ObjectName, Query, SetExpr, Statement, TableFactor, Visit,
    Visitor,
};
use sqlparser::parser::Parser;

use crate::error::ParseFailure;
use crate::model::NormalizedName;
use crate::parser::DialectOptions;

/// Discriminant of a [`SqlNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Select,
    Update,
    Insert,
    Delete,
    TableRef,
    ColumnRef,
    Subquery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlNode {
    Select(SelectNode),
    Update(UpdateNode),
    Insert(InsertNode),
    Delete(DeleteNode),
    TableRef(TableRef),
    ColumnRef(ColumnRef),
    Subquery(SubqueryNode),
}

/// A table or view named in a FROM/JOIN/target position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: NormalizedName,
    pub alias: Option<String>,
}

/// A column reference; `qualifier` is the raw alias or table token, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: NormalizedName,
}

/// A derived table, CTE, table-valued function or expression subquery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubqueryNode {
    pub alias: Option<String>,
    /// Lowered body; empty for table-valued functions and CTE references
    pub body: Vec<SqlNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectNode {
    /// `TableRef` and `Subquery` items of FROM/JOIN
    pub from: Vec<SqlNode>,
    pub columns: Vec<ColumnRef>,
    /// Subqueries in expressions
    pub nested: Vec<SqlNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNode {
    pub target: TableRef,
    pub from: Vec<SqlNode>,
    /// SET targets, assigned values and WHERE
    pub columns: Vec<ColumnRef>,
    pub nested: Vec<SqlNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertNode {
    pub target: TableRef,
    /// Explicit column list
    pub columns: Vec<ColumnRef>,
    /// Lowered source query, if any
    pub source: Vec<SqlNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNode {
    pub target: TableRef,
    pub from: Vec<SqlNode>,
    /// WHERE columns
    pub columns: Vec<ColumnRef>,
    pub nested: Vec<SqlNode>,
}

impl SqlNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            SqlNode::Select(_) => NodeKind::Select,
            SqlNode::Update(_) => NodeKind::Update,
            SqlNode::Insert(_) => NodeKind::Insert,
            SqlNode::Delete(_) => NodeKind::Delete,
            SqlNode::TableRef(_) => NodeKind::TableRef,
            SqlNode::ColumnRef(_) => NodeKind::ColumnRef,
            SqlNode::Subquery(_) => NodeKind::Subquery,
        }
    }

    /// Target table of an UPDATE, INSERT or DELETE.
    pub fn target(&self) -> Option<&TableRef> {
        match self {
            SqlNode::Update(node) => Some(&node.target),
            SqlNode::Insert(node) => Some(&node.target),
            SqlNode::Delete(node) => Some(&node.target),
            _ => None,
        }
    }

    /// FROM/JOIN items.
    pub fn from_items(&self) -> &[SqlNode] {
        match self {
            SqlNode::Select(node) => &node.from,
            SqlNode::Update(node) => &node.from,
            SqlNode::Delete(node) => &node.from,
            _ => &[],
        }
    }

    /// Column references made directly by this node, not by nested queries.
    pub fn column_refs(&self) -> &[ColumnRef] {
        match self {
            SqlNode::Select(node) => &node.columns,
            SqlNode::Update(node) => &node.columns,
            SqlNode::Insert(node) => &node.columns,
            SqlNode::Delete(node) => &node.columns,
            _ => &[],
        }
    }

    /// Queries nested below this node: derived tables, expression subqueries, INSERT sources.
    pub fn children(&self) -> Vec<&SqlNode> {
        let (from, rest): (&[SqlNode], &[SqlNode]) = match self {
            SqlNode::Select(node) => (&node.from, &node.nested),
            SqlNode::Update(node) => (&node.from, &node.nested),
            SqlNode::Delete(node) => (&node.from, &node.nested),
            SqlNode::Insert(node) => (&[], &node.source),
            SqlNode::Subquery(node) => (&[], &node.body),
            SqlNode::TableRef(_) | SqlNode::ColumnRef(_) => (&[], &[]),
        };
        from.iter()
            .chain(rest)
            .flat_map(|node| match node {
                SqlNode::Subquery(sub) => sub.body.iter().collect::<Vec<_>>(),
                SqlNode::TableRef(_) | SqlNode::ColumnRef(_) => Vec::new(),
                other => vec![other],
            })
            .collect()
    }
}

/// The lowered statements of one parse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlTree {
    pub statements: Vec<SqlNode>,
}

impl SqlTree {
    pub fn from_statements(statements: &[Statement]) -> Self {
        Self {
            statements: statements.iter().flat_map(lower_statement).collect(),
        }
    }
}

/// An exact-grammar parser for one statement.
///
/// Implementations run on pool worker threads; a panic is treated as a
/// worker crash.
pub trait StatementParser: Send + Sync {
    fn parse(&self, text: &str, dialect: DialectOptions) -> Result<SqlTree, ParseFailure>;
}

/// [`StatementParser`] backed by sqlparser-rs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlparserBackend;

impl StatementParser for SqlparserBackend {
    fn parse(&self, text: &str, dialect: DialectOptions) -> Result<SqlTree, ParseFailure> {
        let dialect = dialect.build();
        let text = text.trim_start_matches(|c: char| c == ';' || c.is_whitespace());
        let statements = Parser::parse_sql(dialect.as_ref(), text)
            .map_err(|e| ParseFailure::Syntax(e.to_string()))?;
        Ok(SqlTree::from_statements(&statements))
    }
}

/// Run `parser` and turn a panic into [`ParseFailure::Panicked`].
pub(crate) fn parse_guarded(
    parser: &dyn StatementParser,
    text: &str,
    dialect: DialectOptions,
) -> Result<SqlTree, ParseFailure> {
    catch_unwind(AssertUnwindSafe(|| parser.parse(text, dialect))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "parser panicked".to_string());
        Err(ParseFailure::Panicked(message))
    })
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

fn column_ref(parts: &[Ident]) -> Option<ColumnRef> {
    let (last, qualifier) = parts.split_last()?;
    if last.value.starts_with('@') {
        return None;
    }
    let qualifier = (!qualifier.is_empty()).then(|| {
        qualifier
            .iter()
            .map(|ident| ident.value.as_str())
            .collect::<Vec<_>>()
            .join(".")
    });
    Some(ColumnRef {
        qualifier,
        name: NormalizedName::new(&last.value),
    })
}

fn lower_statement(statement: &Statement) -> Vec<SqlNode> {
    match statement {
        Statement::Query(query) => lower_query(query, &[]),
        Statement::Insert(insert) => {
            let mut first = FirstRelation::default();
            let _ = statement.visit(&mut first);
            let Some(target) = first.0 else {
                return Vec::new();
            };
            vec![SqlNode::Insert(InsertNode {
                target: TableRef {
                    name: NormalizedName::new(&target),
                    alias: None,
                },
                columns: insert
                    .columns
                    .iter()
                    .filter_map(|ident| column_ref(std::slice::from_ref(ident)))
                    .collect(),
                source: insert
                    .source
                    .as_ref()
                    .map(|query| lower_query(query, &[]))
                    .unwrap_or_default(),
            })]
        }
        Statement::Update { assignments, .. } => {
            let mut collector = Collector::new(&[]);
            let _ = statement.visit(&mut collector);
            for assignment in assignments {
                match &assignment.target {
                    AssignmentTarget::ColumnName(name) => collector.columns.extend(column_ref(&name.0)),
                    AssignmentTarget::Tuple(names) => collector
                        .columns
                        .extend(names.iter().filter_map(|name| column_ref(&name.0))),
                }
            }
            let mut sources = collector.sources.into_iter();
            let Some(SqlNode::TableRef(first)) = sources.next() else {
                return Vec::new();
            };
            let from: Vec<SqlNode> = sources.collect();
            vec![SqlNode::Update(UpdateNode {
                target: resolve_target(first.name.as_str(), &from).unwrap_or(first),
                from,
                columns: collector.columns,
                nested: collector.nested,
            })]
        }
        Statement::Delete(delete) => {
            let mut collector = Collector::new(&[]);
            let _ = statement.visit(&mut collector);
            let from = collector.sources;
            let target = match delete.tables.first() {
                Some(name) => {
                    let raw = object_name(name);
                    resolve_target(&raw, &from).unwrap_or(TableRef {
                        name: NormalizedName::new(&raw),
                        alias: None,
                    })
                }
                None => match from.first() {
                    Some(SqlNode::TableRef(table)) => table.clone(),
                    _ => return Vec::new(),
                },
            };
            vec![SqlNode::Delete(DeleteNode {
                target,
                from,
                columns: collector.columns,
                nested: collector.nested,
            })]
        }
        _ => Vec::new(),
    }
}

/// `UPDATE e ... FROM Employee e`: a target naming a FROM alias is that FROM table.
fn resolve_target(raw: &str, from: &[SqlNode]) -> Option<TableRef> {
    let token = NormalizedName::new(raw);
    from.iter().find_map(|item| match item {
        SqlNode::TableRef(table)
            if table
                .alias
                .as_deref()
                .is_some_and(|alias| alias.eq_ignore_ascii_case(token.as_str()))
                || table.name == token =>
        {
            Some(table.clone())
        }
        _ => None,
    })
}

fn lower_query(query: &Query, outer_ctes: &[String]) -> Vec<SqlNode> {
    let mut ctes = outer_ctes.to_vec();
    let mut nodes = Vec::new();
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let body = lower_query(&cte.query, &ctes);
            nodes.push(SqlNode::Subquery(SubqueryNode {
                alias: Some(cte.alias.name.value.clone()),
                body,
            }));
            ctes.push(cte.alias.name.value.to_lowercase());
        }
    }
    nodes.extend(lower_set_expr(&query.body, &ctes));
    nodes
}

fn lower_set_expr(body: &SetExpr, ctes: &[String]) -> Vec<SqlNode> {
    match body {
        SetExpr::Select(select) => {
            let mut collector = Collector::new(ctes);
            for table in &select.from {
                let _ = table.visit(&mut collector);
            }
            let _ = select.projection.visit(&mut collector);
            let _ = select.selection.visit(&mut collector);
            let _ = select.group_by.visit(&mut collector);
            let _ = select.having.visit(&mut collector);
            vec![SqlNode::Select(SelectNode {
                from: collector.sources,
                columns: collector.columns,
                nested: collector.nested,
            })]
        }
        SetExpr::Query(query) => lower_query(query, ctes),
        SetExpr::SetOperation { left, right, .. } => {
            let mut nodes = lower_set_expr(left, ctes);
            nodes.extend(lower_set_expr(right, ctes));
            nodes
        }
        SetExpr::Insert(statement) | SetExpr::Update(statement) => lower_statement(statement),
        _ => Vec::new(),
    }
}

/// Captures the first relation name in visit order (an INSERT's target).
#[derive(Default)]
struct FirstRelation(Option<String>);

impl Visitor for FirstRelation {
    type Break = ();

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.0 = Some(object_name(relation));
        ControlFlow::Break(())
    }
}

/// Collects the table sources, column references and nested queries that
/// belong to one query level. Anything below a nested query is lowered
/// separately.
struct Collector<'c> {
    ctes: &'c [String],
    depth: usize,
    skip_next_query: bool,
    sources: Vec<SqlNode>,
    columns: Vec<ColumnRef>,
    nested: Vec<SqlNode>,
}

impl<'c> Collector<'c> {
    fn new(ctes: &'c [String]) -> Self {
        Self {
            ctes,
            depth: 0,
            skip_next_query: false,
            sources: Vec::new(),
            columns: Vec::new(),
            nested: Vec::new(),
        }
    }
}

impl Visitor for Collector<'_> {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if self.depth == 0 && !std::mem::take(&mut self.skip_next_query) {
            self.nested.push(SqlNode::Subquery(SubqueryNode {
                alias: None,
                body: lower_query(query, self.ctes),
            }));
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.depth = self.depth.saturating_sub(1);
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        if self.depth > 0 {
            return ControlFlow::Continue(());
        }
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                let raw = object_name(name);
                let alias = alias.as_ref().map(|a| a.name.value.clone());
                let is_cte = self.ctes.contains(&raw.to_lowercase());
                if args.is_some() || is_cte {
                    self.sources.push(SqlNode::Subquery(SubqueryNode {
                        alias: alias.or(Some(raw)),
                        body: Vec::new(),
                    }));
                } else {
                    self.sources.push(SqlNode::TableRef(TableRef {
                        name: NormalizedName::new(&raw),
                        alias,
                    }));
                }
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                self.skip_next_query = true;
                self.sources.push(SqlNode::Subquery(SubqueryNode {
                    alias: alias.as_ref().map(|a| a.name.value.clone()),
                    body: lower_query(subquery, self.ctes),
                }));
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if self.depth > 0 {
            return ControlFlow::Continue(());
        }
        match expr {
            Expr::Identifier(ident) => self.columns.extend(column_ref(std::slice::from_ref(ident))),
            Expr::CompoundIdentifier(parts) => self.columns.extend(column_ref(parts)),
            _ => {}
        }
        ControlFlow::Continue(())
    }
}
