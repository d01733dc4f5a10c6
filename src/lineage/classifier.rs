use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumIter};

use crate::{
    ast::{ObjectName, Statement},
    error::{LineageError, Result},
};

use super::entities::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StatementKind {
    Select,
    InsertSelect,
    CreateTable,
    CreateTableAsSelect,
    CreateTableLike,
    CreateView,
    Drop,
    Rename,
    Merge,
    Update,
    Unsupported,
}

impl StatementKind {
    /// Kinds that write rows (or a definition) into exactly one target.
    pub fn writes(&self) -> bool {
        matches!(
            self,
            StatementKind::InsertSelect
                | StatementKind::CreateTable
                | StatementKind::CreateTableAsSelect
                | StatementKind::CreateTableLike
                | StatementKind::CreateView
                | StatementKind::Merge
                | StatementKind::Update
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: StatementKind,
    /// Written tables for writing kinds, dropped tables for `DROP`, the new name for a rename.
    pub targets: Vec<Table>,
}

impl Classification {
    /// The single table written by a writing statement.
    pub fn target(&self) -> Result<&Table> {
        match self.targets.as_slice() {
            [target] if self.kind.writes() => Ok(target),
            _ => Err(LineageError::InvariantViolation(format!(
                "`{}` statement is expected to write exactly one table, found {}",
                self.kind,
                self.targets.len()
            ))),
        }
    }
}

pub fn classify(statement: &Statement, default_schema: Option<&str>) -> Classification {
    let table = |name: &ObjectName| Table::from_object_name(name, default_schema);
    let (kind, targets) = match statement {
        Statement::Query(_) => (StatementKind::Select, vec![]),
        Statement::Insert(insert) => (StatementKind::InsertSelect, vec![table(&insert.table)]),
        Statement::CreateTable(create) => {
            let kind = if create.query.is_some() {
                StatementKind::CreateTableAsSelect
            } else if create.like.is_some() {
                StatementKind::CreateTableLike
            } else {
                StatementKind::CreateTable
            };
            (kind, vec![table(&create.name)])
        }
        Statement::CreateView(view) => (StatementKind::CreateView, vec![table(&view.name)]),
        Statement::Drop(drop) => (StatementKind::Drop, drop.names.iter().map(table).collect()),
        Statement::Rename(rename) => (StatementKind::Rename, vec![table(&rename.to)]),
        Statement::Merge(merge) => (StatementKind::Merge, vec![table(&merge.target)]),
        Statement::Update(update) => (StatementKind::Update, vec![table(&update.table)]),
        Statement::Unsupported(_) => (StatementKind::Unsupported, vec![]),
    };
    Classification { kind, targets }
}
