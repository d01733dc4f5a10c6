use std::{collections::HashSet, fmt::Display};

use serde::Deserialize;

use crate::{
    config::LineageConfig,
    frontend::Dialect,
    lineage::catalog::{Catalog, SchemaObject},
};

pub const FRONTEND_TESTS_FILE: &str = "tests/frontend_tests.toml";
pub const LINEAGE_TESTS_FILE: &str = "tests/lineage_tests.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct TestFrontEnd {
    pub sql: String,
    #[serde(default)]
    pub dialect: Dialect,
    pub statements: usize,
    #[serde(default)]
    pub failures: Vec<usize>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestFrontEndData {
    pub tests: Vec<TestFrontEnd>,
}

/// Expected `[source, target]` column pair, both written as `table.column`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestColumnEdge(pub String, pub String);

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineage {
    pub sql: String,
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default)]
    pub default_schema: Option<String>,
    #[serde(default)]
    pub schema_objects: Vec<SchemaObject>,
    #[serde(default)]
    pub source_tables: Vec<String>,
    #[serde(default)]
    pub target_tables: Vec<String>,
    #[serde(default)]
    pub intermediate_tables: Vec<String>,
    /// Checked only when present.
    pub column_lineage: Option<Vec<TestColumnEdge>>,
}

impl TestLineage {
    pub fn config(&self) -> LineageConfig {
        LineageConfig {
            dialect: self.dialect,
            default_schema: self.default_schema.clone(),
            ..LineageConfig::default()
        }
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            schema_objects: self.schema_objects.clone(),
        }
    }

    pub fn expected_columns(&self) -> Option<HashSet<TestColumnEdge>> {
        self.column_lineage
            .as_ref()
            .map(|edges| edges.iter().cloned().collect())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineageData {
    pub tests: Vec<TestLineage>,
}

impl Display for TestLineageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
