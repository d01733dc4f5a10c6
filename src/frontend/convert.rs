use std::cell::Cell;

use sqlparser::ast as sql;

use crate::ast::{
    Assignment, CreateTableStatement, CreateViewStatement, Cte, DropStatement, Expr, FromExpr,
    FunctionExpr, InsertStatement, JoinCondition, JoinExpr, JoinKind, MergeInsert,
    MergeStatement, MergeUpdate, ObjectName, Query, QueryBody, RenameStatement, Select,
    SelectItem, Statement, UnsupportedStatement, UpdateStatement, When, With,
};
use crate::config::{normalize, normalize_text};

/// Lowers `sqlparser` syntax trees into the engine's statement tree.
///
/// A lowering numbers every query it produces, so use a fresh one per statement.
#[derive(Debug)]
pub struct Lowering {
    case_insensitive: bool,
    next_query_id: Cell<usize>,
}

impl Lowering {
    pub fn new(case_insensitive: bool) -> Self {
        Self {
            case_insensitive,
            next_query_id: Cell::new(0),
        }
    }

    fn ident(&self, ident: &sql::Ident) -> String {
        normalize(&ident.value, self.case_insensitive)
    }

    fn text(&self, text: String) -> String {
        normalize_text(&text, self.case_insensitive)
    }

    fn idents(&self, idents: &[sql::Ident]) -> Vec<String> {
        idents.iter().map(|ident| self.ident(ident)).collect()
    }

    /// Quoted paths such as `` `project.dataset.table` `` arrive as one identifier.
    fn object_name(&self, name: &sql::ObjectName) -> ObjectName {
        ObjectName {
            parts: name
                .0
                .iter()
                .flat_map(|ident| {
                    self.ident(ident)
                        .split('.')
                        .map(str::to_owned)
                        .collect::<Vec<_>>()
                })
                .collect(),
        }
    }

    fn alias(&self, alias: &Option<sql::TableAlias>) -> (Option<String>, Vec<String>) {
        match alias {
            Some(alias) => (
                Some(self.ident(&alias.name)),
                alias
                    .columns
                    .iter()
                    .map(|column| self.ident(&column.name))
                    .collect(),
            ),
            None => (None, vec![]),
        }
    }

    pub fn statement(&self, statement: &sql::Statement) -> Statement {
        match statement {
            sql::Statement::Query(query) => self.query_statement(query),
            sql::Statement::Insert(insert) => Statement::Insert(self.insert(insert, None)),
            sql::Statement::CreateTable(create) => Statement::CreateTable(CreateTableStatement {
                name: self.object_name(&create.name),
                columns: create
                    .columns
                    .iter()
                    .map(|column| self.ident(&column.name))
                    .collect(),
                query: create.query.as_deref().map(|query| self.query(query)),
                like: create
                    .like
                    .as_ref()
                    .or(create.clone.as_ref())
                    .map(|name| self.object_name(name)),
            }),
            sql::Statement::CreateView {
                name,
                columns,
                query,
                to,
                ..
            } => Statement::CreateView(CreateViewStatement {
                // ClickHouse materialized views write into their `TO` table.
                name: self.object_name(to.as_ref().unwrap_or(name)),
                columns: columns
                    .iter()
                    .map(|column| self.ident(&column.name))
                    .collect(),
                query: self.query(query),
            }),
            sql::Statement::Drop {
                object_type, names, ..
            } => Statement::Drop(DropStatement {
                object_kind: object_type.to_string(),
                names: names.iter().map(|name| self.object_name(name)).collect(),
            }),
            sql::Statement::AlterTable {
                name, operations, ..
            } => {
                let rename = operations.iter().find_map(|operation| match operation {
                    sql::AlterTableOperation::RenameTable { table_name } => {
                        Some((table_name, false))
                    }
                    sql::AlterTableOperation::SwapWith { table_name } => Some((table_name, true)),
                    _ => None,
                });
                match rename {
                    Some((to, swap)) => Statement::Rename(RenameStatement {
                        from: self.object_name(name),
                        to: self.object_name(to),
                        swap,
                    }),
                    None => Statement::Unsupported(UnsupportedStatement {
                        kind: "ALTER TABLE".to_owned(),
                    }),
                }
            }
            sql::Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            } => self.update(table, assignments, from.as_ref(), selection.as_ref()),
            sql::Statement::Merge {
                table,
                source,
                on,
                clauses,
                ..
            } => self.merge(table, source, on, clauses),
            other => Statement::Unsupported(UnsupportedStatement {
                kind: statement_keyword(other),
            }),
        }
    }

    fn query_statement(&self, query: &sql::Query) -> Statement {
        match query.body.as_ref() {
            // `WITH ... INSERT INTO ...`: the ctes belong to the insert's source query.
            sql::SetExpr::Insert(sql::Statement::Insert(insert)) => {
                Statement::Insert(self.insert(insert, query.with.as_ref()))
            }
            sql::SetExpr::Update(update) => self.statement(update),
            _ => Statement::Query(self.query(query)),
        }
    }

    fn insert(&self, insert: &sql::Insert, outer_with: Option<&sql::With>) -> InsertStatement {
        let mut source = insert.source.as_deref().map(|query| self.query(query));
        if let (Some(outer), Some(source)) = (outer_with, source.as_mut()) {
            let mut with = self.with(outer);
            if let Some(inner) = source.with.take() {
                with.ctes.extend(inner.ctes);
            }
            source.with = Some(with);
        }
        InsertStatement {
            table: self.object_name(&insert.table_name),
            columns: self.idents(&insert.columns),
            source,
        }
    }

    fn update(
        &self,
        table: &sql::TableWithJoins,
        assignments: &[sql::Assignment],
        from: Option<&sql::TableWithJoins>,
        selection: Option<&sql::Expr>,
    ) -> Statement {
        let (name, alias) = match &table.relation {
            sql::TableFactor::Table { name, alias, .. } => {
                (self.object_name(name), self.alias(alias).0)
            }
            _ => {
                return Statement::Unsupported(UnsupportedStatement {
                    kind: "UPDATE".to_owned(),
                });
            }
        };
        // MySQL style `UPDATE t1 JOIN t2 ...` lists extra relations as joins of the target.
        let mut sources: Vec<FromExpr> = table
            .joins
            .iter()
            .map(|join| self.table_factor(&join.relation))
            .collect();
        sources.extend(from.map(|from| self.table_with_joins(from)));
        Statement::Update(UpdateStatement {
            table: name,
            alias,
            assignments: self.assignments(assignments),
            from: sources,
            selection: selection.map(|expr| self.expr(expr)),
        })
    }

    fn assignments(&self, assignments: &[sql::Assignment]) -> Vec<Assignment> {
        let mut out = vec![];
        for assignment in assignments {
            match &assignment.target {
                sql::AssignmentTarget::ColumnName(column) => out.push(Assignment {
                    column: self.object_name(column).base().to_owned(),
                    value: self.expr(&assignment.value),
                }),
                sql::AssignmentTarget::Tuple(columns) => {
                    // `(a, b) = (x, y)` pairs up positionally, `(a, b) = (SELECT ...)` feeds all.
                    let values: Vec<Expr> = match &assignment.value {
                        sql::Expr::Tuple(values) => {
                            values.iter().map(|value| self.expr(value)).collect()
                        }
                        value => vec![self.expr(value); columns.len()],
                    };
                    for (column, value) in columns.iter().zip(values) {
                        out.push(Assignment {
                            column: self.object_name(column).base().to_owned(),
                            value,
                        });
                    }
                }
            }
        }
        out
    }

    fn merge(
        &self,
        table: &sql::TableFactor,
        source: &sql::TableFactor,
        on: &sql::Expr,
        clauses: &[sql::MergeClause],
    ) -> Statement {
        let (target, target_alias) = match table {
            sql::TableFactor::Table { name, alias, .. } => {
                (self.object_name(name), self.alias(alias).0)
            }
            _ => {
                return Statement::Unsupported(UnsupportedStatement {
                    kind: "MERGE".to_owned(),
                });
            }
        };
        let whens = clauses
            .iter()
            .map(|clause| match &clause.action {
                sql::MergeAction::Update { assignments } => When::Update(MergeUpdate {
                    assignments: self.assignments(assignments),
                }),
                sql::MergeAction::Insert(insert) => When::Insert(MergeInsert {
                    columns: self.idents(&insert.columns),
                    values: match &insert.kind {
                        sql::MergeInsertKind::Values(values) => values
                            .rows
                            .first()
                            .map(|row| row.iter().map(|expr| self.expr(expr)).collect())
                            .unwrap_or_default(),
                        // `INSERT ROW` copies the source row column by column.
                        sql::MergeInsertKind::Row => insert
                            .columns
                            .iter()
                            .map(|column| Expr::Column {
                                qualifier: None,
                                name: self.ident(column),
                            })
                            .collect(),
                    },
                }),
                sql::MergeAction::Delete => When::Delete,
            })
            .collect();
        Statement::Merge(Box::new(MergeStatement {
            target,
            target_alias,
            source: self.table_factor(source),
            on: self.expr(on),
            whens,
        }))
    }

    fn with(&self, with: &sql::With) -> With {
        With {
            ctes: with
                .cte_tables
                .iter()
                .map(|cte| Cte {
                    name: self.ident(&cte.alias.name),
                    columns: cte
                        .alias
                        .columns
                        .iter()
                        .map(|column| self.ident(&column.name))
                        .collect(),
                    query: self.query(&cte.query),
                })
                .collect(),
        }
    }

    pub fn query(&self, query: &sql::Query) -> Query {
        let id = self.next_query_id.get();
        self.next_query_id.set(id + 1);
        Query {
            id,
            with: query.with.as_ref().map(|with| self.with(with)),
            body: self.set_expr(&query.body),
        }
    }

    fn set_expr(&self, body: &sql::SetExpr) -> QueryBody {
        match body {
            sql::SetExpr::Select(select) => QueryBody::Select(Box::new(self.select(select))),
            sql::SetExpr::Query(query) => QueryBody::Grouping(Box::new(self.query(query))),
            sql::SetExpr::SetOperation {
                op, left, right, ..
            } => QueryBody::SetOperation {
                op: op.to_string(),
                left: Box::new(self.set_expr(left)),
                right: Box::new(self.set_expr(right)),
            },
            sql::SetExpr::Values(values) => QueryBody::Values(
                values
                    .rows
                    .iter()
                    .map(|row| row.iter().map(|expr| self.expr(expr)).collect())
                    .collect(),
            ),
            _ => QueryBody::Opaque,
        }
    }

    fn select(&self, select: &sql::Select) -> Select {
        Select {
            items: select
                .projection
                .iter()
                .map(|item| self.select_item(item))
                .collect(),
            from: select
                .from
                .iter()
                .map(|from| self.table_with_joins(from))
                .collect(),
            selection: select.selection.as_ref().map(|expr| self.expr(expr)),
            group_by: match &select.group_by {
                sql::GroupByExpr::Expressions(exprs, _) => {
                    exprs.iter().map(|expr| self.expr(expr)).collect()
                }
                sql::GroupByExpr::All(_) => vec![],
            },
            having: select.having.as_ref().map(|expr| self.expr(expr)),
        }
    }

    fn select_item(&self, item: &sql::SelectItem) -> SelectItem {
        match item {
            sql::SelectItem::UnnamedExpr(expr) => SelectItem {
                expr: self.expr(expr),
                alias: None,
                text: self.text(expr.to_string()),
            },
            sql::SelectItem::ExprWithAlias { expr, alias } => SelectItem {
                expr: self.expr(expr),
                alias: Some(self.ident(alias)),
                text: self.text(expr.to_string()),
            },
            sql::SelectItem::QualifiedWildcard(name, _) => SelectItem {
                expr: Expr::Wildcard {
                    qualifier: Some(self.object_name(name)),
                },
                alias: None,
                text: self.text(format!("{}.*", name)),
            },
            sql::SelectItem::Wildcard(_) => SelectItem {
                expr: Expr::Wildcard { qualifier: None },
                alias: None,
                text: "*".to_owned(),
            },
        }
    }

    fn table_with_joins(&self, from: &sql::TableWithJoins) -> FromExpr {
        from.joins
            .iter()
            .fold(self.table_factor(&from.relation), |left, join| {
                let (kind, cond) = self.join_operator(&join.join_operator);
                FromExpr::Join(JoinExpr {
                    kind,
                    left: Box::new(left),
                    right: Box::new(self.table_factor(&join.relation)),
                    cond,
                })
            })
    }

    fn join_operator(&self, operator: &sql::JoinOperator) -> (JoinKind, JoinCondition) {
        use sql::JoinOperator as Op;
        match operator {
            Op::Inner(constraint) => (JoinKind::Inner, self.join_constraint(constraint)),
            Op::LeftOuter(constraint) => (JoinKind::Left, self.join_constraint(constraint)),
            Op::RightOuter(constraint) => (JoinKind::Right, self.join_constraint(constraint)),
            Op::FullOuter(constraint) => (JoinKind::Full, self.join_constraint(constraint)),
            Op::Semi(constraint) | Op::LeftSemi(constraint) | Op::RightSemi(constraint) => {
                (JoinKind::Semi, self.join_constraint(constraint))
            }
            Op::Anti(constraint) | Op::LeftAnti(constraint) | Op::RightAnti(constraint) => {
                (JoinKind::Anti, self.join_constraint(constraint))
            }
            Op::CrossJoin | Op::CrossApply | Op::OuterApply => {
                (JoinKind::Cross, JoinCondition::None)
            }
            Op::AsOf { constraint, .. } => (JoinKind::Other, self.join_constraint(constraint)),
        }
    }

    fn join_constraint(&self, constraint: &sql::JoinConstraint) -> JoinCondition {
        match constraint {
            sql::JoinConstraint::On(expr) => JoinCondition::On(self.expr(expr)),
            sql::JoinConstraint::Using(columns) => JoinCondition::Using(self.idents(columns)),
            sql::JoinConstraint::Natural => JoinCondition::Natural,
            sql::JoinConstraint::None => JoinCondition::None,
        }
    }

    fn table_factor(&self, factor: &sql::TableFactor) -> FromExpr {
        match factor {
            sql::TableFactor::Table {
                name,
                alias,
                args: None,
                ..
            } => FromExpr::Table {
                name: self.object_name(name),
                alias: self.alias(alias).0,
            },
            sql::TableFactor::Table {
                alias,
                args: Some(args),
                ..
            } => FromExpr::Function {
                alias: self.alias(alias).0,
                args: self.function_args(&args.args),
            },
            sql::TableFactor::Derived {
                subquery, alias, ..
            } => {
                let (alias, columns) = self.alias(alias);
                FromExpr::Derived {
                    query: Box::new(self.query(subquery)),
                    alias,
                    columns,
                }
            }
            sql::TableFactor::TableFunction { expr, alias } => FromExpr::Function {
                alias: self.alias(alias).0,
                args: vec![self.expr(expr)],
            },
            sql::TableFactor::Function { args, alias, .. } => FromExpr::Function {
                alias: self.alias(alias).0,
                args: self.function_args(args),
            },
            sql::TableFactor::UNNEST {
                alias, array_exprs, ..
            } => FromExpr::Function {
                alias: self.alias(alias).0,
                args: array_exprs.iter().map(|expr| self.expr(expr)).collect(),
            },
            sql::TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins),
            sql::TableFactor::Pivot { table, alias, .. }
            | sql::TableFactor::Unpivot { table, alias, .. }
            | sql::TableFactor::MatchRecognize { table, alias, .. } => {
                // Reshaped relations keep reading from their input under the outer alias.
                match self.table_factor(table) {
                    FromExpr::Table { name, .. } => FromExpr::Table {
                        name,
                        alias: self.alias(alias).0,
                    },
                    other => other,
                }
            }
            sql::TableFactor::JsonTable {
                json_expr, alias, ..
            }
            | sql::TableFactor::OpenJsonTable {
                json_expr, alias, ..
            } => FromExpr::Function {
                alias: self.alias(alias).0,
                args: vec![self.expr(json_expr)],
            },
        }
    }

    fn function_args(&self, args: &[sql::FunctionArg]) -> Vec<Expr> {
        args.iter()
            .map(|arg| {
                let arg = match arg {
                    sql::FunctionArg::Named { arg, .. }
                    | sql::FunctionArg::ExprNamed { arg, .. }
                    | sql::FunctionArg::Unnamed(arg) => arg,
                };
                match arg {
                    sql::FunctionArgExpr::Expr(expr) => self.expr(expr),
                    sql::FunctionArgExpr::QualifiedWildcard(name) => Expr::Wildcard {
                        qualifier: Some(self.object_name(name)),
                    },
                    sql::FunctionArgExpr::Wildcard => Expr::Wildcard { qualifier: None },
                }
            })
            .collect()
    }

    fn function(&self, function: &sql::Function) -> FunctionExpr {
        let mut args = vec![];
        let mut order_by = vec![];
        match &function.args {
            sql::FunctionArguments::None => {}
            sql::FunctionArguments::Subquery(query) => {
                args.push(Expr::Subquery(Box::new(self.query(query))))
            }
            sql::FunctionArguments::List(list) => {
                args = self.function_args(&list.args);
                for clause in &list.clauses {
                    if let sql::FunctionArgumentClause::OrderBy(exprs) = clause {
                        order_by.extend(exprs.iter().map(|order| self.expr(&order.expr)));
                    }
                }
            }
        }
        let mut partition_by = vec![];
        if let Some(sql::WindowType::WindowSpec(spec)) = &function.over {
            partition_by = spec
                .partition_by
                .iter()
                .map(|expr| self.expr(expr))
                .collect();
            order_by.extend(spec.order_by.iter().map(|order| self.expr(&order.expr)));
        }
        FunctionExpr {
            name: self.object_name(&function.name).to_string(),
            args,
            filter: function
                .filter
                .as_deref()
                .map(|filter| Box::new(self.expr(filter))),
            partition_by,
            order_by,
        }
    }

    fn boxed(&self, expr: &sql::Expr) -> Box<Expr> {
        Box::new(self.expr(expr))
    }

    fn operands<'e>(&self, exprs: impl IntoIterator<Item = &'e sql::Expr>) -> Expr {
        Expr::Other(exprs.into_iter().map(|expr| self.expr(expr)).collect())
    }

    pub fn expr(&self, expr: &sql::Expr) -> Expr {
        use sql::Expr as E;
        match expr {
            E::Identifier(ident) => Expr::Column {
                qualifier: None,
                name: self.ident(ident),
            },
            E::CompoundIdentifier(idents) => match idents.split_last() {
                Some((name, [])) => Expr::Column {
                    qualifier: None,
                    name: self.ident(name),
                },
                Some((name, qualifier)) => Expr::Column {
                    qualifier: Some(ObjectName {
                        parts: self.idents(qualifier),
                    }),
                    name: self.ident(name),
                },
                None => Expr::Literal(String::new()),
            },
            E::Wildcard(_) => Expr::Wildcard { qualifier: None },
            E::QualifiedWildcard(name, _) => Expr::Wildcard {
                qualifier: Some(self.object_name(name)),
            },
            E::Value(_) | E::TypedString { .. } | E::IntroducedString { .. } => {
                Expr::Literal(expr.to_string())
            }
            E::Function(function) => Expr::Function(self.function(function)),
            E::Case {
                operand,
                conditions,
                results,
                else_result,
            } => Expr::Case {
                operand: operand.as_deref().map(|operand| self.boxed(operand)),
                conditions: conditions.iter().map(|expr| self.expr(expr)).collect(),
                results: results.iter().map(|expr| self.expr(expr)).collect(),
                else_result: else_result.as_deref().map(|expr| self.boxed(expr)),
            },
            E::Cast { kind, expr, .. } => Expr::Cast {
                expr: self.boxed(expr),
                shorthand: matches!(kind, sql::CastKind::DoubleColon),
            },
            E::Convert { expr, styles, .. } => Expr::Cast {
                expr: Box::new(self.operands(std::iter::once(expr.as_ref()).chain(styles))),
                shorthand: false,
            },
            E::BinaryOp { left, op, right } => Expr::Binary {
                left: self.boxed(left),
                op: op.to_string(),
                right: self.boxed(right),
            },
            E::UnaryOp { op, expr } => Expr::Unary {
                op: op.to_string(),
                expr: self.boxed(expr),
            },
            E::Nested(inner) => self.expr(inner),
            E::Subquery(query) => Expr::Subquery(Box::new(self.query(query))),
            E::InSubquery { expr, subquery, .. } => Expr::InSubquery {
                expr: self.boxed(expr),
                subquery: Box::new(self.query(subquery)),
            },
            E::Exists { subquery, .. } => Expr::Exists(Box::new(self.query(subquery))),
            E::IsFalse(inner)
            | E::IsNotFalse(inner)
            | E::IsTrue(inner)
            | E::IsNotTrue(inner)
            | E::IsNull(inner)
            | E::IsNotNull(inner)
            | E::IsUnknown(inner)
            | E::IsNotUnknown(inner)
            | E::OuterJoin(inner)
            | E::Prior(inner) => Expr::Unary {
                op: String::new(),
                expr: self.boxed(inner),
            },
            E::IsDistinctFrom(left, right) | E::IsNotDistinctFrom(left, right) => {
                self.operands([left.as_ref(), right.as_ref()])
            }
            E::InList { expr, list, .. } => {
                self.operands(std::iter::once(expr.as_ref()).chain(list))
            }
            E::InUnnest {
                expr, array_expr, ..
            } => self.operands([expr.as_ref(), array_expr.as_ref()]),
            E::Between {
                expr, low, high, ..
            } => self.operands([expr.as_ref(), low.as_ref(), high.as_ref()]),
            E::Like { expr, pattern, .. }
            | E::ILike { expr, pattern, .. }
            | E::SimilarTo { expr, pattern, .. }
            | E::RLike { expr, pattern, .. } => {
                self.operands([expr.as_ref(), pattern.as_ref()])
            }
            E::AnyOp { left, right, .. } | E::AllOp { left, right, .. } => {
                self.operands([left.as_ref(), right.as_ref()])
            }
            E::AtTimeZone {
                timestamp,
                time_zone,
            } => self.operands([timestamp.as_ref(), time_zone.as_ref()]),
            E::Extract { expr, .. }
            | E::Ceil { expr, .. }
            | E::Floor { expr, .. }
            | E::Collate { expr, .. }
            | E::JsonAccess { value: expr, .. }
            | E::CompositeAccess { expr, .. }
            | E::Named { expr, .. } => self.operands([expr.as_ref()]),
            E::Position { expr, r#in } => self.operands([expr.as_ref(), r#in.as_ref()]),
            E::Substring {
                expr,
                substring_from,
                substring_for,
                ..
            } => self.operands(
                std::iter::once(expr.as_ref())
                    .chain(substring_from.as_deref())
                    .chain(substring_for.as_deref()),
            ),
            E::Trim {
                expr,
                trim_what,
                trim_characters,
                ..
            } => self.operands(
                std::iter::once(expr.as_ref())
                    .chain(trim_what.as_deref())
                    .chain(trim_characters.iter().flatten()),
            ),
            E::Overlay {
                expr,
                overlay_what,
                overlay_from,
                overlay_for,
            } => self.operands(
                [expr.as_ref(), overlay_what.as_ref(), overlay_from.as_ref()]
                    .into_iter()
                    .chain(overlay_for.as_deref()),
            ),
            E::MapAccess { column, keys } => self.operands(
                std::iter::once(column.as_ref()).chain(keys.iter().map(|key| &key.key)),
            ),
            E::Method(method) => {
                let mut operands = vec![self.expr(&method.expr)];
                operands.extend(
                    method
                        .method_chain
                        .iter()
                        .map(|function| Expr::Function(self.function(function))),
                );
                Expr::Other(operands)
            }
            E::GroupingSets(sets) | E::Cube(sets) | E::Rollup(sets) => {
                self.operands(sets.iter().flatten())
            }
            E::Tuple(exprs) => self.operands(exprs),
            E::Struct { values, .. } => self.operands(values),
            E::Dictionary(fields) => {
                self.operands(fields.iter().map(|field| field.value.as_ref()))
            }
            E::Map(map) => self.operands(
                map.entries
                    .iter()
                    .flat_map(|entry| [entry.key.as_ref(), entry.value.as_ref()]),
            ),
            E::Subscript { expr, subscript } => {
                let mut operands = vec![self.expr(expr)];
                match subscript.as_ref() {
                    sql::Subscript::Index { index } => operands.push(self.expr(index)),
                    sql::Subscript::Slice {
                        lower_bound,
                        upper_bound,
                        stride,
                    } => operands.extend(
                        [lower_bound, upper_bound, stride]
                            .into_iter()
                            .flatten()
                            .map(|expr| self.expr(expr)),
                    ),
                }
                Expr::Other(operands)
            }
            E::Array(array) => self.operands(&array.elem),
            E::Interval(interval) => self.operands([interval.value.as_ref()]),
            E::Lambda(lambda) => self.operands([lambda.body.as_ref()]),
            E::MatchAgainst { .. } => Expr::Literal(expr.to_string()),
        }
    }
}

/// Leading keywords of a statement, e.g. `DELETE` or `CREATE INDEX`.
fn statement_keyword(statement: &sql::Statement) -> String {
    let text = statement.to_string();
    let mut words = text.split_whitespace();
    match words.next() {
        Some(first @ ("CREATE" | "ALTER" | "DROP" | "SHOW")) => match words.next() {
            Some(second) if second.chars().all(|c| c.is_ascii_alphabetic()) => {
                format!("{} {}", first, second)
            }
            _ => first.to_owned(),
        },
        Some(first) => first.to_owned(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use sqlparser::{dialect::GenericDialect, parser::Parser};

    use super::*;

    fn lower(sql: &str) -> Statement {
        let statements = Parser::parse_sql(&GenericDialect {}, sql).unwrap();
        Lowering::new(true).statement(&statements[0])
    }

    #[test]
    fn select_items_keep_display_text() {
        let Statement::Query(query) = lower("SELECT max(Col1), col2 AS c, t.col3::date FROM t")
        else {
            panic!("expected a query");
        };
        let QueryBody::Select(select) = query.body else {
            panic!("expected a select");
        };
        let names: Vec<_> = select
            .items
            .iter()
            .map(|item| item.output_name().unwrap())
            .collect();
        assert_eq!(names, vec!["max(col1)", "c", "col3"]);
    }

    #[test]
    fn item_text_folds_like_identifiers() {
        let sql = "SELECT MAX(Col1), CASE WHEN Col1 = 1 THEN 'V1' END FROM t";
        let items = |case_insensitive: bool| {
            let statements = Parser::parse_sql(&GenericDialect {}, sql).unwrap();
            let lowering = Lowering::new(case_insensitive);
            let Statement::Query(query) = lowering.statement(&statements[0]) else {
                panic!("expected a query");
            };
            let QueryBody::Select(select) = query.body else {
                panic!("expected a select");
            };
            select
                .items
                .into_iter()
                .map(|item| item.text)
                .collect::<Vec<_>>()
        };
        assert_eq!(
            items(true),
            vec!["max(col1)", "case when col1 = 1 then 'V1' end"]
        );
        assert_eq!(
            items(false),
            vec!["MAX(Col1)", "CASE WHEN Col1 = 1 THEN 'V1' END"]
        );
    }

    #[test]
    fn queries_are_numbered_per_statement() {
        let Statement::Insert(insert) = lower(
            "WITH c AS (SELECT a FROM t1) INSERT INTO t2 SELECT a FROM c WHERE a IN (SELECT a FROM t3)",
        ) else {
            panic!("expected an insert");
        };
        let source = insert.source.unwrap();
        let cte = &source.with.as_ref().unwrap().ctes[0].query;
        let QueryBody::Select(select) = &source.body else {
            panic!("expected a select");
        };
        let Some(Expr::InSubquery { subquery, .. }) = &select.selection else {
            panic!("expected an IN subquery");
        };
        let mut ids = vec![cte.id, source.id, subquery.id];
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);

        let Statement::Query(query) = lower("SELECT a FROM t1") else {
            panic!("expected a query");
        };
        assert_eq!(query.id, 0);
    }

    #[test]
    fn with_insert_moves_ctes_into_source() {
        let Statement::Insert(insert) =
            lower("WITH c AS (SELECT a FROM t1) INSERT INTO t2 SELECT a FROM c")
        else {
            panic!("expected an insert");
        };
        assert_eq!(insert.table, ObjectName::new(["t2"]));
        let ctes = insert.source.unwrap().with.unwrap().ctes;
        assert_eq!(ctes.len(), 1);
        assert_eq!(ctes[0].name, "c");
    }

    #[test]
    fn quoted_paths_are_split() {
        let Statement::Drop(drop) = lower("DROP TABLE \"Sch.Tab1\"") else {
            panic!("expected a drop");
        };
        assert_eq!(drop.names, vec![ObjectName::new(["sch", "tab1"])]);
        assert_eq!(drop.object_kind, "TABLE");
    }

    #[test]
    fn unsupported_statements_are_named() {
        let Statement::Unsupported(unsupported) = lower("CREATE INDEX idx ON t (a)") else {
            panic!("expected an unsupported statement");
        };
        assert_eq!(unsupported.kind, "CREATE INDEX");
    }

    #[test]
    fn alter_rename() {
        let Statement::Rename(rename) = lower("ALTER TABLE tab1 RENAME TO tab2") else {
            panic!("expected a rename");
        };
        assert_eq!(rename.from, ObjectName::new(["tab1"]));
        assert_eq!(rename.to, ObjectName::new(["tab2"]));
        assert!(!rename.swap);
    }
}
