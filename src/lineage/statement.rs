use indexmap::IndexSet;
use serde::Serialize;

use crate::{
    ast::{MergeStatement, Query, Statement, UpdateStatement, When},
    config::LineageConfig,
    error::{Result, Warning},
};

use super::{
    catalog::CatalogIndex,
    classifier::{Classification, StatementKind, classify},
    entities::{ColumnEdge, ColumnRef, Table},
    resolver::{Resolver, ScopeChain},
    scope::{CteMap, ScopeBuilder},
};

/// Lineage contributed by a single statement, before it is merged into the script graphs.
#[derive(Debug, Clone, Serialize)]
pub struct StatementLineage {
    pub kind: StatementKind,
    pub reads: IndexSet<Table>,
    pub writes: IndexSet<Table>,
    pub drops: Vec<Table>,
    /// `(old, new)` name pairs.
    pub renames: Vec<(Table, Table)>,
    pub column_edges: IndexSet<ColumnEdge>,
    pub warnings: IndexSet<Warning>,
}

impl StatementLineage {
    fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            reads: IndexSet::new(),
            writes: IndexSet::new(),
            drops: vec![],
            renames: vec![],
            column_edges: IndexSet::new(),
            warnings: IndexSet::new(),
        }
    }

    fn add_edges(&mut self, sources: IndexSet<ColumnRef>, target: &ColumnRef) {
        for source in sources {
            self.column_edges.insert(ColumnEdge {
                source,
                target: target.clone(),
            });
        }
    }
}

/// Computes the table and column lineage of one statement.
pub fn analyze_statement(
    statement: &Statement,
    catalog: &CatalogIndex,
    config: &LineageConfig,
) -> Result<StatementLineage> {
    let classification = classify(statement, config.default_schema.as_deref());
    let mut analyzer = StatementAnalyzer {
        builder: ScopeBuilder::new(config),
        resolver: Resolver::new(catalog, config.max_depth),
        catalog,
        default_schema: config.default_schema.as_deref(),
        lineage: StatementLineage::new(classification.kind),
    };
    analyzer.analyze(statement, &classification)?;
    Ok(analyzer.finish())
}

struct StatementAnalyzer<'c> {
    builder: ScopeBuilder<'c>,
    resolver: Resolver<'c>,
    catalog: &'c CatalogIndex,
    default_schema: Option<&'c str>,
    lineage: StatementLineage,
}

impl StatementAnalyzer<'_> {
    fn finish(self) -> StatementLineage {
        let mut lineage = self.lineage;
        lineage.warnings.extend(self.builder.into_warnings());
        lineage.warnings.extend(self.resolver.into_warnings());
        lineage
    }

    fn analyze(&mut self, statement: &Statement, classification: &Classification) -> Result<()> {
        match statement {
            Statement::Query(query) => {
                let subquery = self.builder.build_query(query, None, &[], &CteMap::new(), 0)?;
                self.lineage.reads.extend(subquery.read_tables());
            }
            Statement::Insert(insert) => {
                let target = classification.target()?;
                self.lineage.writes.insert(target.clone());
                if let Some(source) = &insert.source {
                    self.query_into(source, &insert.columns, target)?;
                }
            }
            Statement::CreateTable(create) => {
                let target = classification.target()?;
                self.lineage.writes.insert(target.clone());
                if let Some(query) = &create.query {
                    self.query_into(query, &create.columns, target)?;
                }
                if let Some(like) = &create.like {
                    self.lineage
                        .reads
                        .insert(Table::from_object_name(like, self.default_schema));
                }
            }
            Statement::CreateView(view) => {
                let target = classification.target()?;
                self.lineage.writes.insert(target.clone());
                self.query_into(&view.query, &view.columns, target)?;
            }
            Statement::Drop(_) => self.lineage.drops = classification.targets.clone(),
            Statement::Rename(rename) => {
                // Swapping two names leaves the graph unchanged.
                if !rename.swap {
                    let from = Table::from_object_name(&rename.from, self.default_schema);
                    let to = Table::from_object_name(&rename.to, self.default_schema);
                    self.lineage.renames.push((from, to));
                }
            }
            Statement::Merge(merge) => self.merge(merge, classification.target()?)?,
            Statement::Update(update) => self.update(update, classification.target()?)?,
            Statement::Unsupported(unsupported) => {
                let warning = Warning::UnsupportedStatement {
                    statement: unsupported.kind.clone(),
                };
                log::debug!("{}", warning);
                self.lineage.warnings.insert(warning);
            }
        }
        Ok(())
    }

    /// Lineage of a query whose output rows land in `target`.
    ///
    /// An explicit column list renames outputs positionally. Outputs coming from a `*` keep
    /// their name since their position in the target is unknown.
    fn query_into(&mut self, query: &Query, columns: &[String], target: &Table) -> Result<()> {
        let subquery = self.builder.build_query(query, None, &[], &CteMap::new(), 0)?;
        self.lineage.reads.extend(subquery.read_tables());

        let outputs = self.resolver.outputs(&subquery, 0)?;
        for (position, (name, sources)) in outputs.into_iter().enumerate() {
            let name = match columns.get(position) {
                Some(column) if name != "*" => column.clone(),
                _ => name,
            };
            let target_column = ColumnRef::new(&name, target.clone());
            self.lineage.add_edges(sources, &target_column);
        }
        Ok(())
    }

    fn merge(&mut self, merge: &MergeStatement, target: &Table) -> Result<()> {
        let scopes = self.builder.build_merge(merge, target)?;
        self.lineage.writes.insert(target.clone());
        self.lineage.reads.extend(scopes.source.read_tables(0));
        // Subqueries of the ON clause and of UPDATE SET values live in the matched scope.
        self.lineage.reads.extend(scopes.matched.read_tables(1));

        let matched = ScopeChain::root(&scopes.matched);
        let source = ScopeChain::root(&scopes.source);
        for when in &merge.whens {
            match when {
                When::Update(update) => {
                    for assignment in &update.assignments {
                        let mut sources = IndexSet::new();
                        self.resolver
                            .expr_sources(&assignment.value, &matched, 0, &mut sources)?;
                        let column = ColumnRef::new(&assignment.column, target.clone());
                        self.lineage.add_edges(sources, &column);
                    }
                }
                When::Insert(insert) => {
                    // Without a column list values follow the target's declared columns.
                    let columns: Vec<String> = if insert.columns.is_empty() {
                        self.catalog
                            .columns(target)
                            .map(|columns| columns.iter().cloned().collect())
                            .unwrap_or_default()
                    } else {
                        insert.columns.clone()
                    };
                    for (column, value) in columns.iter().zip(&insert.values) {
                        let mut sources = IndexSet::new();
                        self.resolver.expr_sources(value, &source, 0, &mut sources)?;
                        let column = ColumnRef::new(column, target.clone());
                        self.lineage.add_edges(sources, &column);
                    }
                }
                When::Delete => {}
            }
        }
        Ok(())
    }

    fn update(&mut self, update: &UpdateStatement, target: &Table) -> Result<()> {
        let scope = self.builder.build_update(update, target)?;
        self.lineage.writes.insert(target.clone());
        self.lineage.reads.extend(scope.read_tables(1));

        let chain = ScopeChain::root(&scope);
        for assignment in &update.assignments {
            let mut sources = IndexSet::new();
            self.resolver
                .expr_sources(&assignment.value, &chain, 0, &mut sources)?;
            let column = ColumnRef::new(&assignment.column, target.clone());
            self.lineage.add_edges(sources, &column);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::LineageError,
        frontend::{Dialect, FrontEnd, SqlParserFrontEnd},
    };

    use super::*;

    fn analyze(sql: &str) -> Result<StatementLineage> {
        let front_end = SqlParserFrontEnd::new(Dialect::Snowflake, true);
        let parsed = front_end.parse_script(sql);
        let statement = parsed[0].statement.as_ref().unwrap();
        analyze_statement(statement, &CatalogIndex::default(), &LineageConfig::default())
    }

    fn edges(lineage: &StatementLineage) -> Vec<String> {
        lineage
            .column_edges
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn insert_column_list_renames_outputs() {
        let lineage = analyze("INSERT INTO tab1 (x, y) SELECT a, b + c FROM tab2").unwrap();
        assert_eq!(lineage.kind, StatementKind::InsertSelect);
        assert_eq!(edges(&lineage), vec![
            "tab1.x <- tab2.a",
            "tab1.y <- tab2.b",
            "tab1.y <- tab2.c",
        ]);
    }

    #[test]
    fn merge_assignments() {
        let lineage = analyze(
            "MERGE INTO tgt t USING src s ON t.k = s.k \
             WHEN MATCHED THEN UPDATE SET t.v = s.v, t.w = 1 \
             WHEN NOT MATCHED THEN INSERT (k, v) VALUES (s.k, s.v)",
        )
        .unwrap();
        assert_eq!(lineage.reads.iter().collect::<Vec<_>>(), vec![&Table::new(None, "src")]);
        assert_eq!(edges(&lineage), vec![
            "tgt.v <- src.v",
            "tgt.k <- src.k",
        ]);
    }

    #[test]
    fn merge_reads_tables_of_matched_subqueries() {
        let lineage = analyze(
            "MERGE INTO tgt t USING src s ON t.k = s.k AND s.k IN (SELECT k FROM keys) \
             WHEN MATCHED THEN UPDATE SET t.v = (SELECT max(x) FROM other)",
        )
        .unwrap();
        assert_eq!(lineage.reads.iter().collect::<Vec<_>>(), vec![
            &Table::new(None, "src"),
            &Table::new(None, "keys"),
            &Table::new(None, "other"),
        ]);
        assert_eq!(edges(&lineage), vec!["tgt.v <- other.x"]);
    }

    #[test]
    fn update_from_reads_joined_tables() {
        let lineage = analyze("UPDATE tab1 SET col1 = t2.col2 FROM tab2 t2 WHERE tab1.id = t2.id")
            .unwrap();
        assert_eq!(lineage.reads.iter().collect::<Vec<_>>(), vec![&Table::new(None, "tab2")]);
        assert_eq!(edges(&lineage), vec!["tab1.col1 <- tab2.col2"]);
    }

    #[test]
    fn unsupported_statement_only_warns() {
        let lineage = analyze("GRANT SELECT ON t TO r").unwrap();
        assert_eq!(lineage.kind, StatementKind::Unsupported);
        assert!(lineage.reads.is_empty() && lineage.column_edges.is_empty());
        assert_eq!(lineage.warnings.len(), 1);
    }

    #[test]
    fn depth_limit_fails_the_statement() {
        let mut sql = "SELECT a FROM t".to_owned();
        for _ in 0..5 {
            sql = format!("SELECT a FROM ({}) s", sql);
        }
        let front_end = SqlParserFrontEnd::new(Dialect::Generic, true);
        let parsed = front_end.parse_script(&format!("INSERT INTO x {}", sql));
        let config = LineageConfig {
            max_depth: 2,
            ..LineageConfig::default()
        };
        let result = analyze_statement(
            parsed[0].statement.as_ref().unwrap(),
            &CatalogIndex::default(),
            &config,
        );
        assert!(matches!(result, Err(LineageError::TooDeeplyNested { limit: 2 })));
    }
}
