//! # sqlineage
//!
//! A library for extracting table-level and column-level lineage from SQL scripts.
//!
//! # Features
//!
//! - Trace which source tables and columns feed which target tables and columns.
//! - Resolve columns through ctes, nested and correlated subqueries, joins and set operations.
//! - Handle `INSERT ... SELECT`, `CREATE TABLE/VIEW ... AS`, `MERGE`, `UPDATE`, renames and drops.
//! - Use an optional catalog of known tables to attribute unqualified columns over joins.
//! - Keep going past statements that cannot be parsed or resolved, reporting what went wrong.
//! - Process statements in parallel while keeping the merged output deterministic.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlineage::{
//!     config::LineageConfig,
//!     frontend::{Dialect, SqlParserFrontEnd},
//!     lineage::{
//!         ScriptLineage,
//!         catalog::{Catalog, Column, SchemaObject, SchemaObjectKind},
//!     },
//! };
//!
//! fn column(name: &str) -> Column {
//!     Column {
//!         name: name.to_owned(),
//!         dtype: String::new(),
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     env_logger::init();
//!
//!     let sql = r#"
//!         WITH recent AS (SELECT id, amount FROM sales.orders WHERE ts > now() - interval '1 day')
//!         INSERT INTO reporting.daily
//!         SELECT c.name, sum(amount) AS total
//!         FROM recent JOIN sales.customers c ON recent.id = c.id
//!         GROUP BY c.name;
//!     "#;
//!
//!     let catalog = Catalog {
//!         schema_objects: vec![SchemaObject {
//!             name: "sales.orders".to_owned(),
//!             kind: SchemaObjectKind::Table {
//!                 columns: vec![column("id"), column("amount"), column("ts")],
//!             },
//!         }],
//!     };
//!     let config = LineageConfig {
//!         dialect: Dialect::Postgres,
//!         ..LineageConfig::default()
//!     };
//!     let front_end = SqlParserFrontEnd::from_config(&config);
//!     let lineage = ScriptLineage::from_sql(
//!         sql,
//!         &front_end,
//!         &catalog.index(config.case_insensitive)?,
//!         &config,
//!     );
//!
//!     println!("Source tables: {:?}", lineage.source_tables());
//!     for edge in lineage.column_lineage() {
//!         println!("{}", edge);
//!     }
//!     Ok(())
//! }
//! ```
pub mod arena;
pub mod ast;
pub mod config;
pub mod error;
pub mod frontend;
pub mod lineage;
pub mod test_utils;

pub use self::{
    config::LineageConfig,
    error::{LineageError, Warning},
    lineage::{ScriptLineage, extract_lineage},
};
