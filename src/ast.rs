//! Grammar-independent statement tree consumed by the lineage engine.
//!
//! Front ends lower their own syntax trees into these types. Identifiers are expected to be
//! normalized already (case folding, quote stripping), the engine compares them verbatim.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Query(Query),
    Insert(InsertStatement),
    CreateTable(CreateTableStatement),
    CreateView(CreateViewStatement),
    Drop(DropStatement),
    Rename(RenameStatement),
    Merge(Box<MergeStatement>),
    Update(UpdateStatement),
    Unsupported(UnsupportedStatement),
}

/// A possibly qualified object name, e.g. `catalog.schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectName {
    pub parts: Vec<String>,
}

impl ObjectName {
    pub fn new<S: Into<String>>(parts: impl IntoIterator<Item = S>) -> Self {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Last part of the name, the object itself.
    pub fn base(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Everything before the last part joined by `.`, if any.
    pub fn qualifier(&self) -> Option<String> {
        match self.parts.len() {
            0 | 1 => None,
            n => Some(self.parts[..n - 1].join(".")),
        }
    }

    pub fn is_simple(&self) -> bool {
        self.parts.len() == 1
    }
}

impl std::fmt::Display for ObjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertStatement {
    pub table: ObjectName,
    /// Explicit target column list, matched positionally against the source query.
    pub columns: Vec<String>,
    pub source: Option<Query>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableStatement {
    pub name: ObjectName,
    pub columns: Vec<String>,
    pub query: Option<Query>,
    pub like: Option<ObjectName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateViewStatement {
    pub name: ObjectName,
    pub columns: Vec<String>,
    pub query: Query,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropStatement {
    pub object_kind: String,
    pub names: Vec<ObjectName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameStatement {
    pub from: ObjectName,
    pub to: ObjectName,
    /// `SWAP WITH` exchanges both names instead of moving one.
    pub swap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsupportedStatement {
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeStatement {
    pub target: ObjectName,
    pub target_alias: Option<String>,
    pub source: FromExpr,
    pub on: Expr,
    pub whens: Vec<When>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum When {
    Update(MergeUpdate),
    Insert(MergeInsert),
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeUpdate {
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeInsert {
    pub columns: Vec<String>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatement {
    pub table: ObjectName,
    pub alias: Option<String>,
    pub assignments: Vec<Assignment>,
    pub from: Vec<FromExpr>,
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Unique among the queries of one statement, assigned by the front end.
    pub id: usize,
    pub with: Option<With>,
    pub body: QueryBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct With {
    pub ctes: Vec<Cte>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cte {
    pub name: String,
    pub columns: Vec<String>,
    pub query: Query,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryBody {
    Select(Box<Select>),
    SetOperation {
        op: String,
        left: Box<QueryBody>,
        right: Box<QueryBody>,
    },
    Grouping(Box<Query>),
    Values(Vec<Vec<Expr>>),
    /// A body shape the front end could lower no further (e.g. `TABLE t`).
    Opaque,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Select {
    pub items: Vec<SelectItem>,
    pub from: Vec<FromExpr>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
    /// Canonical rendering of `expr`, used as the output name when there is no alias.
    pub text: String,
}

impl SelectItem {
    /// Name this item contributes to its relation's output, `None` for wildcards.
    pub fn output_name(&self) -> Option<String> {
        if let Some(alias) = &self.alias {
            return Some(alias.clone());
        }
        match &self.expr {
            Expr::Wildcard { .. } => None,
            Expr::Column { name, .. } => Some(name.clone()),
            Expr::Cast {
                expr,
                shorthand: true,
            } => match expr.as_ref() {
                Expr::Column { name, .. } => Some(name.clone()),
                _ => Some(self.text.clone()),
            },
            _ => Some(self.text.clone()),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.expr, Expr::Wildcard { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FromExpr {
    Table {
        name: ObjectName,
        alias: Option<String>,
    },
    Derived {
        query: Box<Query>,
        alias: Option<String>,
        columns: Vec<String>,
    },
    Join(JoinExpr),
    /// Table functions, `UNNEST`, `VALUES` and other relations with no inspectable columns.
    Function {
        alias: Option<String>,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinExpr {
    pub kind: JoinKind,
    pub left: Box<FromExpr>,
    pub right: Box<FromExpr>,
    pub cond: JoinCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Semi,
    Anti,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JoinCondition {
    On(Expr),
    Using(Vec<String>),
    Natural,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Column {
        qualifier: Option<ObjectName>,
        name: String,
    },
    Wildcard {
        qualifier: Option<ObjectName>,
    },
    Literal(String),
    Function(FunctionExpr),
    Case {
        operand: Option<Box<Expr>>,
        conditions: Vec<Expr>,
        results: Vec<Expr>,
        else_result: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        /// Postgres style `expr::type`.
        shorthand: bool,
    },
    Binary {
        left: Box<Expr>,
        op: String,
        right: Box<Expr>,
    },
    Unary {
        op: String,
        expr: Box<Expr>,
    },
    Subquery(Box<Query>),
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Query>,
    },
    Exists(Box<Query>),
    /// Any other compound expression, reduced to its operands.
    Other(Vec<Expr>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionExpr {
    pub name: String,
    pub args: Vec<Expr>,
    pub filter: Option<Box<Expr>>,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<Expr>,
}

impl Expr {
    /// Direct operands of this expression. Subquery bodies are not descended into.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column { .. }
            | Expr::Wildcard { .. }
            | Expr::Literal(_)
            | Expr::Subquery(_)
            | Expr::Exists(_) => vec![],
            Expr::Function(function) => function
                .args
                .iter()
                .chain(function.filter.as_deref())
                .chain(function.partition_by.iter())
                .chain(function.order_by.iter())
                .collect(),
            Expr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => operand
                .as_deref()
                .into_iter()
                .chain(conditions.iter())
                .chain(results.iter())
                .chain(else_result.as_deref())
                .collect(),
            Expr::Cast { expr, .. } | Expr::Unary { expr, .. } | Expr::InSubquery { expr, .. } => {
                vec![expr.as_ref()]
            }
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Other(exprs) => exprs.iter().collect(),
        }
    }

    /// Subqueries nested directly in this expression tree, outermost first.
    pub fn subqueries(&self) -> Vec<&Query> {
        let mut out = vec![];
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Subquery(query) | Expr::Exists(query) => out.push(query.as_ref()),
                Expr::InSubquery { subquery, .. } => out.push(subquery.as_ref()),
                _ => {}
            }
            stack.extend(expr.children().into_iter().rev());
        }
        out
    }
}

impl Query {
    /// Whether any relation in this query, at any depth, is a bare reference to `name`.
    pub fn references_table(&self, name: &str) -> bool {
        self.with
            .as_ref()
            .is_some_and(|with| with.ctes.iter().any(|cte| cte.query.references_table(name)))
            || self.body.references_table(name)
    }
}

impl QueryBody {
    fn references_table(&self, name: &str) -> bool {
        match self {
            QueryBody::Select(select) => {
                select.from.iter().any(|from| from.references_table(name))
                    || select
                        .items
                        .iter()
                        .map(|item| &item.expr)
                        .chain(select.selection.iter())
                        .chain(select.having.iter())
                        .flat_map(Expr::subqueries)
                        .any(|query| query.references_table(name))
            }
            QueryBody::SetOperation { left, right, .. } => {
                left.references_table(name) || right.references_table(name)
            }
            QueryBody::Grouping(query) => query.references_table(name),
            QueryBody::Values(_) | QueryBody::Opaque => false,
        }
    }
}

impl FromExpr {
    fn references_table(&self, name: &str) -> bool {
        match self {
            FromExpr::Table { name: table, .. } => table.is_simple() && table.base() == name,
            FromExpr::Derived { query, .. } => query.references_table(name),
            FromExpr::Join(join) => {
                join.left.references_table(name) || join.right.references_table(name)
            }
            FromExpr::Function { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Expr {
        Expr::Column {
            qualifier: None,
            name: name.to_owned(),
        }
    }

    #[test]
    fn output_names() {
        let aliased = SelectItem {
            expr: col("a"),
            alias: Some("b".to_owned()),
            text: "a".to_owned(),
        };
        assert_eq!(aliased.output_name().as_deref(), Some("b"));

        let shorthand_cast = SelectItem {
            expr: Expr::Cast {
                expr: Box::new(col("col1")),
                shorthand: true,
            },
            alias: None,
            text: "col1::TIMESTAMP".to_owned(),
        };
        assert_eq!(shorthand_cast.output_name().as_deref(), Some("col1"));

        let function = SelectItem {
            expr: Expr::Function(FunctionExpr {
                name: "max".to_owned(),
                args: vec![col("col1")],
                filter: None,
                partition_by: vec![],
                order_by: vec![],
            }),
            alias: None,
            text: "max(col1)".to_owned(),
        };
        assert_eq!(function.output_name().as_deref(), Some("max(col1)"));

        let wildcard = SelectItem {
            expr: Expr::Wildcard { qualifier: None },
            alias: None,
            text: "*".to_owned(),
        };
        assert!(wildcard.output_name().is_none());
    }

    #[test]
    fn object_name_parts() {
        let name = ObjectName::new(["db", "sch", "tab"]);
        assert_eq!(name.base(), "tab");
        assert_eq!(name.qualifier().as_deref(), Some("db.sch"));
        assert!(!name.is_simple());
        assert_eq!(name.to_string(), "db.sch.tab");
    }
}
