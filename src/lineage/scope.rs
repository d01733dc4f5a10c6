//! Name-resolution scopes.
//!
//! A [`Scope`] is built once per `SELECT` (or `MERGE`/`UPDATE`) and never mutated afterwards.
//! Relations bound in it are base tables, ctes, derived subqueries or opaque relations whose
//! columns cannot be inspected. Subqueries appearing inside expressions are scoped eagerly as well
//! and looked up by query id when the resolver reaches them.

use std::{collections::HashSet, rc::Rc};

use indexmap::{IndexMap, IndexSet};

use crate::{
    ast::{Expr, FromExpr, JoinCondition, MergeStatement, ObjectName, Query, QueryBody, Select,
        SelectItem, UpdateStatement, When},
    config::LineageConfig,
    error::{LineageError, Result, Warning},
};

use super::entities::Table;

/// Ctes visible at some point of a statement, in definition order.
pub type CteMap<'a> = IndexMap<String, Relation<'a>>;

#[derive(Debug, Clone)]
pub enum Relation<'a> {
    Table(Table),
    Cte(Rc<SubQuery<'a>>),
    SubQuery(Rc<SubQuery<'a>>),
    Opaque(String),
}

#[derive(Debug, Clone)]
pub struct Binding<'a> {
    pub alias: Option<String>,
    pub relation: Relation<'a>,
}

impl Binding<'_> {
    /// Whether a column qualifier designates this binding.
    ///
    /// Base tables answer to their alias and to their own name. Aliased ctes and subqueries are
    /// only reachable through the alias, unaliased subqueries are not addressable at all.
    pub fn is_named_by(&self, qualifier: &ObjectName) -> bool {
        let by_alias = self
            .alias
            .as_ref()
            .is_some_and(|alias| qualifier.is_simple() && qualifier.base() == alias);
        by_alias || matches!(&self.relation, Relation::Table(table) if table.is_named_by(qualifier))
    }
}

/// A relation defined by a query: one branch per set-operation operand.
#[derive(Debug)]
pub struct SubQuery<'a> {
    /// Id of the defining query.
    pub id: usize,
    pub name: Option<String>,
    /// Column aliases declared next to the name, e.g. `cte (a, b) AS (...)`.
    pub columns: Vec<String>,
    pub branches: Vec<Branch<'a>>,
}

#[derive(Debug)]
pub struct Branch<'a> {
    pub items: &'a [SelectItem],
    pub scope: Scope<'a>,
}

impl SubQuery<'_> {
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<subquery>".to_owned())
    }

    /// Whether the relation provably exposes a column named `name`.
    pub fn declares(&self, name: &str) -> bool {
        if !self.columns.is_empty() {
            return self.columns.iter().any(|column| column == name);
        }
        self.branches.first().is_some_and(|branch| {
            branch
                .items
                .iter()
                .any(|item| item.output_name().as_deref() == Some(name))
        })
    }

    /// Base tables read by this relation, at any depth.
    pub fn read_tables(&self) -> IndexSet<Table> {
        let mut tables = IndexSet::new();
        self.collect_tables(&mut tables, &mut HashSet::new());
        tables
    }

    fn collect_tables(&self, tables: &mut IndexSet<Table>, seen: &mut HashSet<usize>) {
        if !seen.insert(self.id) {
            return;
        }
        for branch in &self.branches {
            branch.scope.collect_tables(0, tables, seen);
        }
    }
}

#[derive(Debug, Default)]
pub struct Scope<'a> {
    bindings: Vec<Binding<'a>>,
    subqueries: IndexMap<usize, Rc<SubQuery<'a>>>,
}

impl<'a> Scope<'a> {
    pub fn bindings(&self) -> &[Binding<'a>] {
        &self.bindings
    }

    pub fn lookup(&self, qualifier: &ObjectName) -> Option<&Binding<'a>> {
        self.bindings
            .iter()
            .find(|binding| binding.is_named_by(qualifier))
    }

    /// The scoped form of a subquery expression of this scope.
    pub fn subquery(&self, query: &Query) -> Option<&Rc<SubQuery<'a>>> {
        self.subqueries.get(&query.id)
    }

    /// Base tables read through this scope, ignoring its first `skip` bindings.
    pub fn read_tables(&self, skip: usize) -> IndexSet<Table> {
        let mut tables = IndexSet::new();
        self.collect_tables(skip, &mut tables, &mut HashSet::new());
        tables
    }

    fn collect_tables(
        &self,
        skip: usize,
        tables: &mut IndexSet<Table>,
        seen: &mut HashSet<usize>,
    ) {
        for binding in self.bindings.iter().skip(skip) {
            match &binding.relation {
                Relation::Table(table) => {
                    tables.insert(table.clone());
                }
                Relation::Cte(subquery) | Relation::SubQuery(subquery) => {
                    subquery.collect_tables(tables, seen)
                }
                Relation::Opaque(_) => {}
            }
        }
        for subquery in self.subqueries.values() {
            subquery.collect_tables(tables, seen);
        }
    }
}

/// Scopes of a `MERGE`: `matched` sees target and source, `source` only the source relation.
#[derive(Debug)]
pub struct MergeScopes<'a> {
    pub matched: Scope<'a>,
    pub source: Scope<'a>,
}

pub struct ScopeBuilder<'c> {
    default_schema: Option<&'c str>,
    max_depth: usize,
    warnings: IndexSet<Warning>,
}

impl<'c> ScopeBuilder<'c> {
    pub fn new(config: &'c LineageConfig) -> Self {
        Self {
            default_schema: config.default_schema.as_deref(),
            max_depth: config.max_depth,
            warnings: IndexSet::new(),
        }
    }

    pub fn into_warnings(self) -> IndexSet<Warning> {
        self.warnings
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(LineageError::TooDeeplyNested {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    /// Scopes `query` and everything nested in it. `ctes` are the ctes visible from outside.
    pub fn build_query<'a>(
        &mut self,
        query: &'a Query,
        name: Option<&str>,
        columns: &[String],
        ctes: &CteMap<'a>,
        depth: usize,
    ) -> Result<SubQuery<'a>> {
        self.check_depth(depth)?;

        let mut ctes = ctes.clone();
        if let Some(with) = &query.with {
            // Each cte only sees the ones defined before it.
            for cte in &with.ctes {
                // `RECURSIVE` is optional in several dialects, self references alone decide.
                let relation = if cte.query.references_table(&cte.name) {
                    let warning = Warning::RecursiveCte {
                        cte: cte.name.clone(),
                    };
                    log::warn!("{}", warning);
                    self.warnings.insert(warning);
                    Relation::Opaque(cte.name.clone())
                } else {
                    Relation::Cte(Rc::new(self.build_query(
                        &cte.query,
                        Some(&cte.name),
                        &cte.columns,
                        &ctes,
                        depth + 1,
                    )?))
                };
                ctes.insert(cte.name.clone(), relation);
            }
        }

        let mut branches = vec![];
        self.build_body(&query.body, &ctes, depth, &mut branches)?;
        Ok(SubQuery {
            id: query.id,
            name: name.map(str::to_owned),
            columns: columns.to_vec(),
            branches,
        })
    }

    fn build_body<'a>(
        &mut self,
        body: &'a QueryBody,
        ctes: &CteMap<'a>,
        depth: usize,
        branches: &mut Vec<Branch<'a>>,
    ) -> Result<()> {
        match body {
            QueryBody::Select(select) => {
                let scope = self.build_select(select, ctes, depth)?;
                branches.push(Branch {
                    items: &select.items,
                    scope,
                });
            }
            QueryBody::SetOperation { left, right, .. } => {
                self.build_body(left, ctes, depth, branches)?;
                self.build_body(right, ctes, depth, branches)?;
            }
            QueryBody::Grouping(query) => {
                let grouped = self.build_query(query, None, &[], ctes, depth + 1)?;
                branches.extend(grouped.branches);
            }
            QueryBody::Values(_) | QueryBody::Opaque => {}
        }
        Ok(())
    }

    fn build_select<'a>(
        &mut self,
        select: &'a Select,
        ctes: &CteMap<'a>,
        depth: usize,
    ) -> Result<Scope<'a>> {
        let mut scope = Scope::default();
        // Comma separated relations bind exactly like joined ones.
        for from in &select.from {
            self.bind_from(from, ctes, &mut scope, depth)?;
        }
        let exprs = select
            .items
            .iter()
            .map(|item| &item.expr)
            .chain(select.selection.iter())
            .chain(select.group_by.iter())
            .chain(select.having.iter());
        for expr in exprs {
            self.bind_subqueries(expr, ctes, &mut scope, depth)?;
        }
        Ok(scope)
    }

    fn bind_from<'a>(
        &mut self,
        from: &'a FromExpr,
        ctes: &CteMap<'a>,
        scope: &mut Scope<'a>,
        depth: usize,
    ) -> Result<()> {
        match from {
            FromExpr::Table { name, alias } => {
                let cte = if name.is_simple() {
                    ctes.get(name.base())
                } else {
                    None
                };
                let binding = match cte {
                    Some(relation) => Binding {
                        alias: Some(alias.clone().unwrap_or_else(|| name.base().to_owned())),
                        relation: relation.clone(),
                    },
                    None => Binding {
                        alias: alias.clone(),
                        relation: Relation::Table(Table::from_object_name(
                            name,
                            self.default_schema,
                        )),
                    },
                };
                scope.bindings.push(binding);
            }
            FromExpr::Derived {
                query,
                alias,
                columns,
            } => {
                let subquery = self.build_query(query, alias.as_deref(), columns, ctes, depth + 1)?;
                scope.bindings.push(Binding {
                    alias: alias.clone(),
                    relation: Relation::SubQuery(Rc::new(subquery)),
                });
            }
            FromExpr::Join(join) => {
                self.bind_from(&join.left, ctes, scope, depth)?;
                self.bind_from(&join.right, ctes, scope, depth)?;
                if let JoinCondition::On(expr) = &join.cond {
                    self.bind_subqueries(expr, ctes, scope, depth)?;
                }
            }
            FromExpr::Function { alias, args } => {
                for arg in args {
                    self.bind_subqueries(arg, ctes, scope, depth)?;
                }
                scope.bindings.push(Binding {
                    alias: alias.clone(),
                    relation: Relation::Opaque(alias.clone().unwrap_or_default()),
                });
            }
        }
        Ok(())
    }

    fn bind_subqueries<'a>(
        &mut self,
        expr: &'a Expr,
        ctes: &CteMap<'a>,
        scope: &mut Scope<'a>,
        depth: usize,
    ) -> Result<()> {
        for query in expr.subqueries() {
            let subquery = self.build_query(query, None, &[], ctes, depth + 1)?;
            scope.subqueries.insert(query.id, Rc::new(subquery));
        }
        Ok(())
    }

    pub fn build_merge<'a>(
        &mut self,
        merge: &'a MergeStatement,
        target: &Table,
    ) -> Result<MergeScopes<'a>> {
        let ctes = CteMap::new();

        let mut source = Scope::default();
        self.bind_from(&merge.source, &ctes, &mut source, 0)?;

        let mut matched = Scope::default();
        matched.bindings.push(Binding {
            alias: merge.target_alias.clone(),
            relation: Relation::Table(target.clone()),
        });
        matched.bindings.extend(source.bindings.iter().cloned());
        self.bind_subqueries(&merge.on, &ctes, &mut matched, 0)?;

        for when in &merge.whens {
            match when {
                When::Update(update) => {
                    for assignment in &update.assignments {
                        self.bind_subqueries(&assignment.value, &ctes, &mut matched, 0)?;
                    }
                }
                When::Insert(insert) => {
                    for value in &insert.values {
                        self.bind_subqueries(value, &ctes, &mut source, 0)?;
                    }
                }
                When::Delete => {}
            }
        }
        Ok(MergeScopes { matched, source })
    }

    /// The target is always the first binding of the returned scope.
    pub fn build_update<'a>(
        &mut self,
        update: &'a UpdateStatement,
        target: &Table,
    ) -> Result<Scope<'a>> {
        let ctes = CteMap::new();
        let mut scope = Scope::default();
        scope.bindings.push(Binding {
            alias: update.alias.clone(),
            relation: Relation::Table(target.clone()),
        });
        for from in &update.from {
            self.bind_from(from, &ctes, &mut scope, 0)?;
        }
        let exprs = update
            .assignments
            .iter()
            .map(|assignment| &assignment.value)
            .chain(update.selection.iter());
        for expr in exprs {
            self.bind_subqueries(expr, &ctes, &mut scope, 0)?;
        }
        Ok(scope)
    }
}
