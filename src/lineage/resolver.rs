use indexmap::{IndexMap, IndexSet};

use crate::{
    ast::{Expr, ObjectName, Query},
    error::{LineageError, Result, Warning},
};

use super::{
    catalog::CatalogIndex,
    entities::ColumnRef,
    scope::{Relation, Scope, SubQuery},
};

/// Output columns of a relation, in order, with the columns each one is derived from.
pub type Outputs = Vec<(String, IndexSet<ColumnRef>)>;

/// Scopes visible from some expression, innermost first.
#[derive(Debug, Clone, Copy)]
pub struct ScopeChain<'s, 'a> {
    pub scope: &'s Scope<'a>,
    pub outer: Option<&'s ScopeChain<'s, 'a>>,
}

impl<'s, 'a> ScopeChain<'s, 'a> {
    pub fn root(scope: &'s Scope<'a>) -> Self {
        Self { scope, outer: None }
    }

    fn links(&self) -> impl Iterator<Item = &ScopeChain<'s, 'a>> {
        std::iter::successors(Some(self), |link| link.outer)
    }
}

/// Attributes columns referenced by expressions to the base table columns they are read from.
pub struct Resolver<'c> {
    catalog: &'c CatalogIndex,
    max_depth: usize,
    warnings: IndexSet<Warning>,
}

impl<'c> Resolver<'c> {
    pub fn new(catalog: &'c CatalogIndex, max_depth: usize) -> Self {
        Self {
            catalog,
            max_depth,
            warnings: IndexSet::new(),
        }
    }

    pub fn into_warnings(self) -> IndexSet<Warning> {
        self.warnings
    }

    fn warn(&mut self, warning: Warning) {
        if !self.warnings.contains(&warning) {
            log::warn!("{}", warning);
            self.warnings.insert(warning);
        }
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(LineageError::TooDeeplyNested {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    /// Output columns of `subquery`.
    ///
    /// Names come from the declared column list when there is one, otherwise from the first
    /// branch. Operands of a set operation contribute positionally.
    pub fn outputs(&mut self, subquery: &SubQuery<'_>, depth: usize) -> Result<Outputs> {
        if subquery.columns.is_empty() {
            self.body_outputs(subquery, depth)
        } else {
            self.declared_outputs(subquery, depth)
        }
    }

    fn body_outputs(&mut self, subquery: &SubQuery<'_>, depth: usize) -> Result<Outputs> {
        self.check_depth(depth)?;
        let Some(first) = subquery.branches.first() else {
            return Ok(vec![]);
        };

        let mut outputs: Outputs = vec![];
        for (position, item) in first.items.iter().enumerate() {
            if item.is_wildcard() {
                let mut expanded: IndexMap<String, IndexSet<ColumnRef>> = IndexMap::new();
                for branch in &subquery.branches {
                    let Some(Expr::Wildcard { qualifier }) =
                        branch.items.get(position).map(|item| &item.expr)
                    else {
                        continue;
                    };
                    let chain = ScopeChain::root(&branch.scope);
                    for (name, sources) in self.expand_wildcard(qualifier.as_ref(), &chain, depth)? {
                        expanded.entry(name).or_default().extend(sources);
                    }
                }
                outputs.extend(expanded);
                continue;
            }

            let mut sources = IndexSet::new();
            for branch in &subquery.branches {
                if let Some(item) = branch.items.get(position).filter(|item| !item.is_wildcard()) {
                    let chain = ScopeChain::root(&branch.scope);
                    self.expr_sources(&item.expr, &chain, depth, &mut sources)?;
                }
            }
            outputs.push((item.output_name().unwrap_or_default(), sources));
        }
        Ok(outputs)
    }

    /// Outputs of a subquery with a column list, e.g. `cte (a, b) AS (...)`.
    ///
    /// Declared names bind to body outputs by position. A `*` over a table the catalog does not
    /// know hides every later position, those columns resolve to `<unknown>`.
    fn declared_outputs(&mut self, subquery: &SubQuery<'_>, depth: usize) -> Result<Outputs> {
        let body = self.body_outputs(subquery, depth)?;
        let body: Outputs = body
            .into_iter()
            .flat_map(|(name, sources)| self.expand_table_wildcard(name, sources))
            .collect();
        let known = body
            .iter()
            .position(|(name, _)| name == "*")
            .unwrap_or(body.len());

        let mut outputs = vec![];
        for (position, column) in subquery.columns.iter().enumerate() {
            let sources = match body.get(position) {
                Some((_, sources)) if position < known => sources.clone(),
                _ => {
                    self.warn(Warning::UnknownColumnOf {
                        relation: subquery.label(),
                        column: column.clone(),
                    });
                    IndexSet::from([ColumnRef::unknown(column)])
                }
            };
            outputs.push((column.clone(), sources));
        }
        Ok(outputs)
    }

    /// Replaces a `table.*` output by the table's catalog columns when they are known.
    fn expand_table_wildcard(&self, name: String, sources: IndexSet<ColumnRef>) -> Outputs {
        if name == "*" && sources.len() == 1 {
            let columns = sources
                .first()
                .filter(|source| source.column == "*")
                .and_then(|source| source.table.as_ref())
                .and_then(|table| Some((table, self.catalog.columns(table)?)));
            if let Some((table, columns)) = columns {
                return columns
                    .iter()
                    .map(|column| {
                        (
                            column.clone(),
                            IndexSet::from([ColumnRef::new(column, table.clone())]),
                        )
                    })
                    .collect();
            }
        }
        vec![(name, sources)]
    }

    /// Adds to `out` every column `expr` is computed from.
    pub fn expr_sources(
        &mut self,
        expr: &Expr,
        chain: &ScopeChain<'_, '_>,
        depth: usize,
        out: &mut IndexSet<ColumnRef>,
    ) -> Result<()> {
        match expr {
            Expr::Column { qualifier, name } => {
                self.column_sources(qualifier.as_ref(), name, chain, depth, out)?
            }
            Expr::Wildcard { qualifier } => {
                for (_, sources) in self.expand_wildcard(qualifier.as_ref(), chain, depth)? {
                    out.extend(sources);
                }
            }
            Expr::Literal(_) => {}
            Expr::Subquery(query) | Expr::Exists(query) => {
                self.subquery_sources(query, chain, depth, out)?
            }
            Expr::InSubquery { expr, subquery } => {
                self.expr_sources(expr, chain, depth, out)?;
                self.subquery_sources(subquery, chain, depth, out)?;
            }
            _ => {
                for child in expr.children() {
                    self.expr_sources(child, chain, depth, out)?;
                }
            }
        }
        Ok(())
    }

    fn subquery_sources(
        &mut self,
        query: &Query,
        chain: &ScopeChain<'_, '_>,
        depth: usize,
        out: &mut IndexSet<ColumnRef>,
    ) -> Result<()> {
        self.check_depth(depth + 1)?;
        let Some(subquery) = chain.links().find_map(|link| link.scope.subquery(query)) else {
            return Err(LineageError::InvariantViolation(
                "subquery expression reached before being scoped".to_owned(),
            ));
        };
        // Correlated references fall through to the enclosing scopes.
        for branch in &subquery.branches {
            let inner = ScopeChain {
                scope: &branch.scope,
                outer: Some(chain),
            };
            for item in branch.items {
                self.expr_sources(&item.expr, &inner, depth + 1, out)?;
            }
        }
        Ok(())
    }

    fn column_sources(
        &mut self,
        qualifier: Option<&ObjectName>,
        name: &str,
        chain: &ScopeChain<'_, '_>,
        depth: usize,
        out: &mut IndexSet<ColumnRef>,
    ) -> Result<()> {
        let relation = match qualifier {
            Some(qualifier) => {
                match chain.links().find_map(|link| link.scope.lookup(qualifier)) {
                    Some(binding) => &binding.relation,
                    None => {
                        self.warn(Warning::UnknownQualifier {
                            qualifier: qualifier.to_string(),
                            column: name.to_owned(),
                        });
                        out.insert(ColumnRef::unknown(name));
                        return Ok(());
                    }
                }
            }
            None => match self.lookup_unqualified(chain, name) {
                Some(relation) => relation,
                None => {
                    self.warn(Warning::UnresolvedColumn {
                        column: name.to_owned(),
                    });
                    out.insert(ColumnRef::unknown(name));
                    return Ok(());
                }
            },
        };
        self.relation_column(relation, name, depth, out)
    }

    fn relation_column(
        &mut self,
        relation: &Relation<'_>,
        name: &str,
        depth: usize,
        out: &mut IndexSet<ColumnRef>,
    ) -> Result<()> {
        match relation {
            Relation::Table(table) => {
                out.insert(ColumnRef::new(name, table.clone()));
            }
            Relation::Cte(subquery) | Relation::SubQuery(subquery) => {
                if !self.subquery_column(subquery, name, depth + 1, out)? {
                    self.warn(Warning::UnknownColumnOf {
                        relation: subquery.label(),
                        column: name.to_owned(),
                    });
                    out.insert(ColumnRef::unknown(name));
                }
            }
            Relation::Opaque(_) => {
                out.insert(ColumnRef::unknown(name));
            }
        }
        Ok(())
    }

    /// Resolves output column `name` of `subquery`. Returns `false` when it exposes no such column.
    fn subquery_column(
        &mut self,
        subquery: &SubQuery<'_>,
        name: &str,
        depth: usize,
        out: &mut IndexSet<ColumnRef>,
    ) -> Result<bool> {
        self.check_depth(depth)?;
        let Some(first) = subquery.branches.first() else {
            return Ok(false);
        };

        if !subquery.columns.is_empty() {
            let Some(position) = subquery.columns.iter().position(|column| column == name) else {
                return Ok(false);
            };
            let mut outputs = self.declared_outputs(subquery, depth)?;
            out.extend(outputs.swap_remove(position).1);
            return Ok(true);
        }

        let position = first
            .items
            .iter()
            .position(|item| item.output_name().as_deref() == Some(name));
        if let Some(position) = position {
            for branch in &subquery.branches {
                if let Some(item) = branch.items.get(position).filter(|item| !item.is_wildcard()) {
                    let chain = ScopeChain::root(&branch.scope);
                    self.expr_sources(&item.expr, &chain, depth, out)?;
                }
            }
            return Ok(true);
        }

        // Not listed explicitly, the column may still come through a `*`.
        let mut found = false;
        for branch in &subquery.branches {
            let chain = ScopeChain::root(&branch.scope);
            for item in branch.items {
                if let Expr::Wildcard { qualifier } = &item.expr {
                    found = true;
                    self.column_sources(qualifier.as_ref(), name, &chain, depth, out)?;
                }
            }
        }
        Ok(found)
    }

    fn expand_wildcard(
        &mut self,
        qualifier: Option<&ObjectName>,
        chain: &ScopeChain<'_, '_>,
        depth: usize,
    ) -> Result<Outputs> {
        let relations: Vec<&Relation<'_>> = match qualifier {
            Some(qualifier) => match chain.links().find_map(|link| link.scope.lookup(qualifier)) {
                Some(binding) => vec![&binding.relation],
                None => {
                    self.warn(Warning::UnknownQualifier {
                        qualifier: qualifier.to_string(),
                        column: "*".to_owned(),
                    });
                    return Ok(vec![("*".to_owned(), IndexSet::from([ColumnRef::unknown("*")]))]);
                }
            },
            None => chain
                .scope
                .bindings()
                .iter()
                .map(|binding| &binding.relation)
                .collect(),
        };

        let mut outputs = vec![];
        for relation in relations {
            match relation {
                Relation::Table(table) => outputs.push((
                    "*".to_owned(),
                    IndexSet::from([ColumnRef::new("*", table.clone())]),
                )),
                Relation::Cte(subquery) | Relation::SubQuery(subquery) => {
                    outputs.extend(self.outputs(subquery, depth + 1)?)
                }
                Relation::Opaque(_) => {
                    outputs.push(("*".to_owned(), IndexSet::from([ColumnRef::unknown("*")])))
                }
            }
        }
        Ok(outputs)
    }

    /// Finds the relation owning an unqualified column.
    ///
    /// A relation that provably exposes the column wins. Otherwise a lone relation owns every
    /// column. A scope without relations defers to the enclosing one.
    fn lookup_unqualified<'s, 'a>(
        &self,
        chain: &ScopeChain<'s, 'a>,
        name: &str,
    ) -> Option<&'s Relation<'a>> {
        for link in chain.links() {
            let bindings = link.scope.bindings();
            if bindings.is_empty() {
                continue;
            }
            let mut owners = bindings
                .iter()
                .filter(|binding| self.declares(&binding.relation, name));
            return match (owners.next(), owners.next()) {
                (Some(owner), None) => Some(&owner.relation),
                (Some(_), Some(_)) => None,
                (None, _) if bindings.len() == 1 => Some(&bindings[0].relation),
                (None, _) => None,
            };
        }
        None
    }

    fn declares(&self, relation: &Relation<'_>, name: &str) -> bool {
        match relation {
            Relation::Table(table) => self.catalog.declares(table, name),
            Relation::Cte(subquery) | Relation::SubQuery(subquery) => subquery.declares(name),
            Relation::Opaque(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::Statement,
        config::LineageConfig,
        frontend::{Dialect, FrontEnd, SqlParserFrontEnd},
        lineage::{
            catalog::Catalog,
            scope::{CteMap, ScopeBuilder},
        },
    };

    use super::*;

    fn query_outputs(sql: &str, catalog: &CatalogIndex) -> (Vec<(String, Vec<String>)>, Vec<Warning>) {
        let front_end = SqlParserFrontEnd::new(Dialect::Generic, true);
        let parsed = front_end.parse_script(sql);
        let Ok(Statement::Query(query)) = &parsed[0].statement else {
            panic!("expected a query");
        };
        let config = LineageConfig::default();
        let mut builder = ScopeBuilder::new(&config);
        let subquery = builder
            .build_query(query, None, &[], &CteMap::new(), 0)
            .unwrap();
        let mut resolver = Resolver::new(catalog, config.max_depth);
        let outputs = resolver
            .outputs(&subquery, 0)
            .unwrap()
            .into_iter()
            .map(|(name, sources)| (name, sources.iter().map(ToString::to_string).collect()))
            .collect();
        (outputs, resolver.into_warnings().into_iter().collect())
    }

    fn output(name: &str, sources: &[&str]) -> (String, Vec<String>) {
        (
            name.to_owned(),
            sources.iter().map(|source| source.to_string()).collect(),
        )
    }

    #[test]
    fn resolves_through_ctes_and_subqueries() {
        let (outputs, warnings) = query_outputs(
            "WITH c AS (SELECT id, amount * 2 AS doubled FROM orders) \
             SELECT s.id, s.doubled FROM (SELECT id, doubled FROM c) s",
            &CatalogIndex::default(),
        );
        assert_eq!(
            outputs,
            vec![
                output("id", &["orders.id"]),
                output("doubled", &["orders.amount"]),
            ]
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn unqualified_column_over_join_is_unknown() {
        let (outputs, warnings) = query_outputs(
            "SELECT col1 FROM tab1 a JOIN tab2 b ON a.id = b.id",
            &CatalogIndex::default(),
        );
        assert_eq!(outputs, vec![output("col1", &["<unknown>.col1"])]);
        assert_eq!(
            warnings,
            vec![Warning::UnresolvedColumn {
                column: "col1".to_owned()
            }]
        );
    }

    #[test]
    fn catalog_disambiguates_joins() {
        let catalog = Catalog::from_json_str(
            r#"{"schema_objects": [
                {"name": "tab1", "kind": {"table": {"columns": [{"name": "id"}, {"name": "col1"}]}}},
                {"name": "tab2", "kind": {"table": {"columns": [{"name": "id"}, {"name": "col2"}]}}}
            ]}"#,
        )
        .unwrap()
        .index(true)
        .unwrap();
        let (outputs, _) = query_outputs(
            "SELECT col1, col2 FROM tab1 a JOIN tab2 b ON a.id = b.id",
            &catalog,
        );
        assert_eq!(
            outputs,
            vec![output("col1", &["tab1.col1"]), output("col2", &["tab2.col2"])]
        );
    }

    #[test]
    fn cte_output_names_disambiguate_joins() {
        let (outputs, _) = query_outputs(
            "WITH a AS (SELECT x FROM t1), b AS (SELECT y FROM t2) \
             SELECT x, y FROM a JOIN b ON TRUE",
            &CatalogIndex::default(),
        );
        assert_eq!(
            outputs,
            vec![output("x", &["t1.x"]), output("y", &["t2.y"])]
        );
    }

    #[test]
    fn union_branches_contribute_positionally() {
        let (outputs, _) = query_outputs(
            "SELECT a AS v FROM t1 UNION ALL SELECT b FROM t2",
            &CatalogIndex::default(),
        );
        assert_eq!(outputs, vec![output("v", &["t1.a", "t2.b"])]);
    }

    #[test]
    fn wildcards_expand_through_subqueries() {
        let (outputs, _) = query_outputs(
            "SELECT * FROM (SELECT a, b AS c FROM t1) s JOIN t2 ON s.a = t2.a",
            &CatalogIndex::default(),
        );
        assert_eq!(
            outputs,
            vec![
                output("a", &["t1.a"]),
                output("c", &["t1.b"]),
                output("*", &["t2.*"]),
            ]
        );
    }

    #[test]
    fn correlated_subquery_reads_outer_scope() {
        let (outputs, _) = query_outputs(
            "SELECT (SELECT max(o.amount) FROM orders o WHERE o.cid = c.id) AS top FROM customers c",
            &CatalogIndex::default(),
        );
        assert_eq!(outputs, vec![output("top", &["orders.amount"])]);
    }

    #[test]
    fn unknown_qualifier_warns() {
        let (outputs, warnings) = query_outputs("SELECT z.a FROM t1", &CatalogIndex::default());
        assert_eq!(outputs, vec![output("a", &["<unknown>.a"])]);
        assert_eq!(
            warnings,
            vec![Warning::UnknownQualifier {
                qualifier: "z".to_owned(),
                column: "a".to_owned()
            }]
        );
    }

    #[test]
    fn declared_columns_over_unknown_wildcard_warn() {
        let (outputs, warnings) = query_outputs(
            "WITH c (x, y) AS (SELECT * FROM t) SELECT x, y FROM c",
            &CatalogIndex::default(),
        );
        assert_eq!(
            outputs,
            vec![output("x", &["<unknown>.x"]), output("y", &["<unknown>.y"])]
        );
        assert_eq!(
            warnings,
            vec![
                Warning::UnknownColumnOf {
                    relation: "c".to_owned(),
                    column: "x".to_owned()
                },
                Warning::UnknownColumnOf {
                    relation: "c".to_owned(),
                    column: "y".to_owned()
                },
            ]
        );
    }

    #[test]
    fn declared_columns_follow_catalog_order() {
        let catalog = Catalog::from_json_str(
            r#"{"schema_objects": [
                {"name": "t", "kind": {"table": {"columns": [{"name": "a"}, {"name": "b"}]}}}
            ]}"#,
        )
        .unwrap()
        .index(true)
        .unwrap();
        let (outputs, warnings) = query_outputs(
            "WITH c (x, y, z) AS (SELECT *, 1 FROM t) SELECT x, y, z FROM c",
            &catalog,
        );
        assert_eq!(
            outputs,
            vec![
                output("x", &["t.a"]),
                output("y", &["t.b"]),
                output("z", &[]),
            ]
        );
        assert!(warnings.is_empty());
    }
}
