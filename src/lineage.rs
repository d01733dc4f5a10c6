pub mod catalog;
pub mod classifier;
pub mod entities;
pub mod graph;
pub mod resolver;
pub mod scope;
pub mod statement;

use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{
    ast::Statement,
    config::LineageConfig,
    error::{LineageError, Result, Warning},
    frontend::{FrontEnd, ParsedStatement},
};

pub use self::{
    catalog::{Catalog, CatalogIndex, Column, SchemaObject, SchemaObjectKind},
    classifier::StatementKind,
    entities::{ColumnEdge, ColumnRef, Table},
    graph::DiGraph,
    statement::{StatementLineage, analyze_statement},
};

/// Computes the lineage of each statement, on the rayon pool if `config.parallel` is set.
///
/// Results are returned in statement order whatever the scheduling.
pub fn extract_lineage(
    statements: &[&Statement],
    catalog: &CatalogIndex,
    config: &LineageConfig,
) -> Vec<Result<StatementLineage>> {
    if config.parallel && statements.len() > 1 {
        let threads = std::thread::available_parallelism()
            .map(|threads| threads.get())
            .unwrap_or(1);
        let n_chunks = std::cmp::max(1, statements.len() / threads);
        statements
            .par_chunks(n_chunks)
            .flat_map(|statements| _extract_lineage(statements, catalog, config))
            .collect()
    } else {
        _extract_lineage(statements, catalog, config)
    }
}

fn _extract_lineage(
    statements: &[&Statement],
    catalog: &CatalogIndex,
    config: &LineageConfig,
) -> Vec<Result<StatementLineage>> {
    statements
        .iter()
        .map(|statement| analyze_statement(statement, catalog, config))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementReport {
    pub index: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<StatementKind>,
    pub targets: Vec<Table>,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LineageError>,
}

/// Granularity of a lineage report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LineageLevel {
    #[default]
    Table,
    Column,
}

#[derive(Serialize, Debug, Clone)]
pub struct TableLineageEntry {
    pub target: String,
    pub sources: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ColumnLineageEntry {
    pub source: String,
    pub target: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct LineageReport {
    pub statements: Vec<StatementReport>,
    pub source_tables: Vec<String>,
    pub target_tables: Vec<String>,
    pub intermediate_tables: Vec<String>,
    pub table_lineage: Vec<TableLineageEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_lineage: Option<Vec<ColumnLineageEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_paths: Option<Vec<Vec<String>>>,
}

/// Lineage of a whole script: statement results merged in statement order.
#[derive(Debug, Clone, Default)]
pub struct ScriptLineage {
    table_graph: DiGraph<Table>,
    column_graph: DiGraph<ColumnRef>,
    read: IndexSet<Table>,
    written: IndexSet<Table>,
    reports: Vec<StatementReport>,
}

impl ScriptLineage {
    pub fn from_sql(
        sql: &str,
        front_end: &dyn FrontEnd,
        catalog: &CatalogIndex,
        config: &LineageConfig,
    ) -> Self {
        log::debug!("Parsing script with front end `{}`.", front_end.name());
        Self::from_parsed(front_end.parse_script(sql), catalog, config)
    }

    /// Analyzes the successfully parsed statements and merges every outcome, failures included.
    pub fn from_parsed(
        parsed: Vec<ParsedStatement>,
        catalog: &CatalogIndex,
        config: &LineageConfig,
    ) -> Self {
        let statements: Vec<&Statement> = parsed
            .iter()
            .filter_map(|parsed| parsed.statement.as_ref().ok())
            .collect();
        let mut lineages = extract_lineage(&statements, catalog, config).into_iter();

        let mut script = ScriptLineage::default();
        for parsed in &parsed {
            let result = match &parsed.statement {
                Ok(_) => lineages.next().unwrap_or_else(|| {
                    Err(LineageError::InvariantViolation(
                        "missing lineage for a parsed statement".to_owned(),
                    ))
                }),
                Err(err) => Err(err.clone()),
            };
            script.merge(parsed, result);
        }
        script
    }

    fn merge(&mut self, parsed: &ParsedStatement, result: Result<StatementLineage>) {
        let lineage = match result {
            Ok(lineage) => lineage,
            Err(err) => {
                log::warn!("Skipping statement {}: {}", parsed.index, err);
                self.reports.push(StatementReport {
                    index: parsed.index,
                    text: parsed.text.clone(),
                    kind: None,
                    targets: vec![],
                    warnings: vec![],
                    error: Some(err),
                });
                return;
            }
        };

        for table in &lineage.reads {
            self.table_graph.add_node(table);
            self.read.insert(table.clone());
        }
        for target in &lineage.writes {
            self.table_graph.add_node(target);
            self.written.insert(target.clone());
            for source in &lineage.reads {
                self.table_graph.add_edge(source, target);
            }
        }
        for edge in &lineage.column_edges {
            self.column_graph.add_edge(&edge.source, &edge.target);
        }
        for (old, new) in &lineage.renames {
            self.table_graph.rename(old, new);
            if self.read.shift_remove(old) {
                self.read.insert(new.clone());
            }
            if self.written.shift_remove(old) {
                self.written.insert(new.clone());
            }
        }
        for table in &lineage.drops {
            self.table_graph.retire_if_isolated(table);
        }

        let mut targets: Vec<Table> = lineage.writes.iter().cloned().collect();
        targets.extend(lineage.drops.iter().cloned());
        targets.extend(lineage.renames.iter().map(|(_, new)| new.clone()));
        self.reports.push(StatementReport {
            index: parsed.index,
            text: parsed.text.clone(),
            kind: Some(lineage.kind),
            targets,
            warnings: lineage.warnings.into_iter().collect(),
            error: None,
        });
    }

    fn has_foreign_predecessor(&self, table: &Table) -> bool {
        self.table_graph.predecessors(table).any(|other| other != table)
    }

    fn has_foreign_successor(&self, table: &Table) -> bool {
        self.table_graph.successors(table).any(|other| other != table)
    }

    /// Tables read by the script and not produced by any of its statements.
    pub fn source_tables(&self) -> IndexSet<Table> {
        self.table_graph
            .nodes()
            .filter(|table| self.read.contains(*table) && !self.has_foreign_predecessor(table))
            .cloned()
            .collect()
    }

    /// Tables written by the script and not consumed by any later statement.
    pub fn target_tables(&self) -> IndexSet<Table> {
        self.table_graph
            .nodes()
            .filter(|table| self.written.contains(*table) && !self.has_foreign_successor(table))
            .cloned()
            .collect()
    }

    /// Tables both produced and consumed within the script.
    pub fn intermediate_tables(&self) -> IndexSet<Table> {
        self.table_graph
            .nodes()
            .filter(|table| self.has_foreign_predecessor(table) && self.has_foreign_successor(table))
            .cloned()
            .collect()
    }

    /// Source tables of every written table.
    pub fn table_lineage(&self) -> IndexMap<Table, IndexSet<Table>> {
        self.table_graph
            .nodes()
            .filter(|table| self.written.contains(*table))
            .map(|table| {
                let sources = self.table_graph.predecessors(table).cloned().collect();
                (table.clone(), sources)
            })
            .collect()
    }

    /// Column edges in discovery order.
    pub fn column_lineage(&self) -> Vec<ColumnEdge> {
        self.column_graph
            .edges()
            .map(|(source, target)| ColumnEdge {
                source: source.clone(),
                target: target.clone(),
            })
            .collect()
    }

    /// Every maximal source to target path through the column graph.
    pub fn column_paths(&self) -> Vec<Vec<ColumnRef>> {
        self.column_graph
            .paths()
            .into_iter()
            .map(|path| path.into_iter().cloned().collect())
            .collect()
    }

    pub fn table_graph(&self) -> &DiGraph<Table> {
        &self.table_graph
    }

    pub fn column_graph(&self) -> &DiGraph<ColumnRef> {
        &self.column_graph
    }

    pub fn is_empty(&self) -> bool {
        self.table_graph.is_empty() && self.column_graph.is_empty()
    }

    pub fn contains_table(&self, table: &Table) -> bool {
        self.table_graph.contains_node(table)
    }

    pub fn contains_column_edge(&self, source: &ColumnRef, target: &ColumnRef) -> bool {
        self.column_graph.contains_edge(source, target)
    }

    pub fn reports(&self) -> &[StatementReport] {
        &self.reports
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.reports.iter().flat_map(|report| report.warnings.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StatementReport> {
        self.reports.iter().filter(|report| report.error.is_some())
    }

    pub fn report(&self, level: LineageLevel) -> LineageReport {
        let names = |tables: IndexSet<Table>| -> Vec<String> {
            tables.iter().map(ToString::to_string).collect()
        };
        let column_level = level == LineageLevel::Column;
        LineageReport {
            statements: self.reports.clone(),
            source_tables: names(self.source_tables()),
            target_tables: names(self.target_tables()),
            intermediate_tables: names(self.intermediate_tables()),
            table_lineage: self
                .table_lineage()
                .into_iter()
                .map(|(target, sources)| TableLineageEntry {
                    target: target.to_string(),
                    sources: sources.iter().map(ToString::to_string).collect(),
                })
                .collect(),
            column_lineage: column_level.then(|| {
                self.column_lineage()
                    .iter()
                    .map(|edge| ColumnLineageEntry {
                        source: edge.source.to_string(),
                        target: edge.target.to_string(),
                    })
                    .collect()
            }),
            column_paths: column_level.then(|| {
                self.column_paths()
                    .iter()
                    .map(|path| path.iter().map(ToString::to_string).collect())
                    .collect()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::frontend::SqlParserFrontEnd;

    use super::*;

    fn lineage(sql: &str, parallel: bool) -> ScriptLineage {
        let config = LineageConfig {
            parallel,
            ..LineageConfig::default()
        };
        let front_end = SqlParserFrontEnd::from_config(&config);
        ScriptLineage::from_sql(sql, &front_end, &CatalogIndex::default(), &config)
    }

    fn tables(tables: IndexSet<Table>) -> Vec<String> {
        tables.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn script_level_classification() {
        let lineage = lineage(
            "INSERT INTO tab2 SELECT a FROM tab1; \
             INSERT INTO tab3 SELECT a FROM tab2; \
             CREATE TABLE tab4 (a INT)",
            false,
        );
        assert_eq!(tables(lineage.source_tables()), vec!["tab1"]);
        assert_eq!(tables(lineage.target_tables()), vec!["tab3", "tab4"]);
        assert_eq!(tables(lineage.intermediate_tables()), vec!["tab2"]);
        assert!(lineage.table_lineage()[&Table::new(None, "tab4")].is_empty());
    }

    #[test]
    fn parallel_run_keeps_statement_order() {
        let sql: Vec<String> = (0..64)
            .map(|idx| format!("INSERT INTO t{} SELECT c{} FROM s{}", idx, idx, idx))
            .collect();
        let sql = sql.join(";\n");
        let sequential = lineage(&sql, false).column_lineage();
        let parallel = lineage(&sql, true).column_lineage();
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.len(), 64);
    }

    #[test]
    fn failures_are_reported_in_place() {
        let lineage = lineage(
            "INSERT INTO tab2 SELECT a FROM tab1; SELEC broken; INSERT INTO tab3 SELECT b FROM tab2",
            true,
        );
        let failures: Vec<usize> = lineage.failures().map(|report| report.index).collect();
        assert_eq!(failures, vec![1]);
        assert_eq!(lineage.reports().len(), 3);
        assert_eq!(lineage.column_lineage().len(), 2);
    }

    #[test]
    fn rename_and_drop() {
        let lineage = lineage(
            "CREATE TABLE tmp AS SELECT a FROM src; \
             ALTER TABLE tmp RENAME TO dst; \
             CREATE TABLE scratch (a INT); \
             DROP TABLE scratch",
            false,
        );
        assert!(!lineage.contains_table(&Table::new(None, "tmp")));
        assert!(!lineage.contains_table(&Table::new(None, "scratch")));
        assert_eq!(tables(lineage.target_tables()), vec!["dst"]);
        assert_eq!(tables(lineage.source_tables()), vec!["src"]);
    }

    #[test]
    fn report_levels() {
        let lineage = lineage("INSERT INTO tab2 SELECT a FROM tab1", false);
        let table_report = lineage.report(LineageLevel::Table);
        assert!(table_report.column_lineage.is_none());

        let column_report = lineage.report(LineageLevel::Column);
        let paths = column_report.column_paths.unwrap();
        assert_eq!(paths, vec![vec!["tab1.a".to_owned(), "tab2.a".to_owned()]]);
        let json = serde_json::to_value(lineage.report(LineageLevel::Column)).unwrap();
        assert_eq!(json["column_lineage"][0]["source"], "tab1.a");
        assert_eq!(json["statements"][0]["kind"], "insert-select");
    }

    #[test]
    fn empty_script() {
        let lineage = lineage("", false);
        assert!(lineage.is_empty());
        assert!(lineage.reports().is_empty());
    }
}
