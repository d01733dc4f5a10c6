use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::ast::ObjectName;

/// A persistent relation, identified by an optional schema qualifier plus its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Table {
    pub schema: Option<String>,
    pub name: String,
}

impl Table {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_owned),
            name: name.to_owned(),
        }
    }

    /// Builds a table from a dotted name, attaching `default_schema` when the name is bare.
    pub fn from_object_name(name: &ObjectName, default_schema: Option<&str>) -> Self {
        Self {
            schema: name.qualifier().or_else(|| default_schema.map(str::to_owned)),
            name: name.base().to_owned(),
        }
    }

    /// Parses `schema.name` (or a bare `name`) as written in catalogs and test data.
    pub fn parse(qualified: &str) -> Self {
        match qualified.rsplit_once('.') {
            Some((schema, name)) => Self::new(Some(schema), name),
            None => Self::new(None, qualified),
        }
    }

    /// Whether a column qualifier such as `t` or `sch.t` designates this table.
    pub fn is_named_by(&self, qualifier: &ObjectName) -> bool {
        if qualifier.base() != self.name {
            return false;
        }
        match qualifier.qualifier() {
            None => true,
            Some(schema) => self.schema.as_deref() == Some(schema.as_str()),
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A column owned by a table. `table` is `None` when the owner could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub column: String,
    pub table: Option<Table>,
}

pub const UNKNOWN_TABLE: &str = "<unknown>";

impl ColumnRef {
    pub fn new(column: &str, table: Table) -> Self {
        Self {
            column: column.to_owned(),
            table: Some(table),
        }
    }

    pub fn unknown(column: &str) -> Self {
        Self {
            column: column.to_owned(),
            table: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.table.is_none()
    }

    pub fn is_wildcard(&self) -> bool {
        self.column == "*"
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => write!(f, "{}.{}", UNKNOWN_TABLE, self.column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnEdge {
    pub source: ColumnRef,
    pub target: ColumnRef,
}

impl Display for ColumnEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <- {}", self.target, self.source)
    }
}
