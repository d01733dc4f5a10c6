use std::collections::HashMap;

use anyhow::anyhow;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::entities::Table;
use crate::config::normalize;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub dtype: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchemaObject {
    pub name: String, // This is the schema.name uid
    pub kind: SchemaObjectKind,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Catalog {
    pub schema_objects: Vec<SchemaObject>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "snake_case")]
pub enum SchemaObjectKind {
    Table { columns: Vec<Column> },
    View { columns: Vec<Column> },
}

impl SchemaObjectKind {
    fn columns(&self) -> &[Column] {
        match self {
            SchemaObjectKind::Table { columns } | SchemaObjectKind::View { columns } => columns,
        }
    }
}

impl Catalog {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| anyhow!("Failed to parse JSON catalog due to error: {}", err))
    }

    /// Builds the lookup structure used during column resolution.
    pub fn index(&self, case_insensitive: bool) -> anyhow::Result<CatalogIndex> {
        let mut columns = HashMap::new();
        for schema_object in &self.schema_objects {
            let table = Table::parse(&normalize(&schema_object.name, case_insensitive));
            if columns.contains_key(&table) {
                return Err(anyhow!(
                    "Found duplicate definition of schema object `{}`.",
                    schema_object.name
                ));
            }
            let table_columns: IndexSet<String> = schema_object
                .kind
                .columns()
                .iter()
                .map(|column| normalize(&column.name, case_insensitive))
                .collect();
            columns.insert(table, table_columns);
        }
        Ok(CatalogIndex { columns })
    }
}

/// Known columns per table.
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    columns: HashMap<Table, IndexSet<String>>,
}

impl CatalogIndex {
    pub fn columns(&self, table: &Table) -> Option<&IndexSet<String>> {
        self.columns.get(table).or_else(|| {
            // A catalog entry without schema also describes the same table under any schema.
            self.columns.get(&Table {
                schema: None,
                name: table.name.clone(),
            })
        })
    }

    pub fn declares(&self, table: &Table, column: &str) -> bool {
        self.columns(table)
            .is_some_and(|columns| columns.contains(column))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(json: &str) -> Catalog {
        Catalog::from_json_str(json).unwrap()
    }

    #[test]
    fn index_normalizes_names() {
        let catalog = catalog(
            r#"{"schema_objects": [
                {"name": "Sch.Tab1", "kind": {"table": {"columns": [{"name": "Col1", "dtype": "int"}]}}},
                {"name": "tab2", "kind": {"view": {"columns": [{"name": "col2"}]}}}
            ]}"#,
        );
        let index = catalog.index(true).unwrap();

        assert!(index.declares(&Table::new(Some("sch"), "tab1"), "col1"));
        assert!(!index.declares(&Table::new(Some("sch"), "tab1"), "col2"));
        assert!(index.declares(&Table::new(Some("any"), "tab2"), "col2"));
        assert!(index.columns(&Table::new(None, "tab3")).is_none());
    }

    #[test]
    fn duplicate_objects_are_rejected() {
        let catalog = catalog(
            r#"{"schema_objects": [
                {"name": "tab1", "kind": {"table": {"columns": []}}},
                {"name": "TAB1", "kind": {"table": {"columns": []}}}
            ]}"#,
        );
        assert!(catalog.index(true).is_err());
        assert!(catalog.index(false).is_ok());
    }
}
