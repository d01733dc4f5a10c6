//! SQL front ends: text in, engine statements out.

pub mod convert;
pub mod split;

use serde::{Deserialize, Serialize};
use sqlparser::{dialect::dialect_from_str, parser::Parser};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::{ast::Statement, config::LineageConfig, error::LineageError};

use self::{convert::Lowering, split::split_statements};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Dialect {
    #[default]
    Generic,
    Ansi,
    Bigquery,
    Clickhouse,
    Databricks,
    Duckdb,
    Hive,
    Mssql,
    Mysql,
    #[serde(alias = "postgresql")]
    #[strum(to_string = "postgres", serialize = "postgresql")]
    Postgres,
    Redshift,
    Snowflake,
    Sqlite,
}

/// One statement of a script as produced by a front end.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub index: usize,
    pub text: String,
    pub statement: Result<Statement, LineageError>,
}

/// Anything able to turn a script into engine statements.
///
/// Failures are per statement: a statement that cannot be parsed is reported in place and the
/// remaining ones are still returned.
pub trait FrontEnd: Sync {
    fn name(&self) -> &str;

    fn parse_script(&self, sql: &str) -> Vec<ParsedStatement>;
}

/// Front end backed by the `sqlparser` crate.
#[derive(Debug, Clone)]
pub struct SqlParserFrontEnd {
    dialect: Dialect,
    case_insensitive: bool,
}

impl SqlParserFrontEnd {
    pub fn new(dialect: Dialect, case_insensitive: bool) -> Self {
        Self {
            dialect,
            case_insensitive,
        }
    }

    pub fn from_config(config: &LineageConfig) -> Self {
        Self::new(config.dialect, config.case_insensitive)
    }
}

impl FrontEnd for SqlParserFrontEnd {
    fn name(&self) -> &str {
        self.dialect.as_ref()
    }

    fn parse_script(&self, sql: &str) -> Vec<ParsedStatement> {
        let Some(dialect) = dialect_from_str(self.dialect.as_ref()) else {
            return vec![ParsedStatement {
                index: 0,
                text: sql.to_owned(),
                statement: Err(LineageError::FrontEnd {
                    index: 0,
                    message: format!("Dialect `{}` is not available.", self.dialect),
                }),
            }];
        };

        let mut parsed = vec![];
        for text in split_statements(&*dialect, sql) {
            match Parser::parse_sql(&*dialect, text) {
                Ok(statements) => {
                    for statement in statements {
                        let lowering = Lowering::new(self.case_insensitive);
                        parsed.push(ParsedStatement {
                            index: parsed.len(),
                            text: text.to_owned(),
                            statement: Ok(lowering.statement(&statement)),
                        });
                    }
                }
                Err(err) => {
                    log::warn!("Could not parse statement `{}`: {}", text, err);
                    parsed.push(ParsedStatement {
                        index: parsed.len(),
                        text: text.to_owned(),
                        statement: Err(LineageError::FrontEnd {
                            index: parsed.len(),
                            message: err.to_string(),
                        }),
                    });
                }
            }
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_dialect_is_available() {
        for dialect in Dialect::iter() {
            assert!(
                dialect_from_str(dialect.as_ref()).is_some(),
                "missing dialect {}",
                dialect
            );
        }
    }

    #[test]
    fn dialect_names() {
        assert_eq!(Dialect::from_str("postgresql").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_str("BigQuery").unwrap(), Dialect::Bigquery);
        assert_eq!(Dialect::Postgres.to_string(), "postgres");
        assert!(Dialect::from_str("cobol").is_err());
    }

    #[test]
    fn failures_stay_local() {
        let front_end = SqlParserFrontEnd::new(Dialect::Generic, true);
        let parsed = front_end.parse_script(
            "INSERT INTO t1 SELECT a FROM t2; SELEC a FROM t; INSERT INTO t3 SELECT b FROM t4",
        );

        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].statement.is_ok());
        assert!(matches!(
            parsed[1].statement,
            Err(LineageError::FrontEnd { index: 1, .. })
        ));
        assert!(parsed[2].statement.is_ok());
        assert_eq!(parsed[2].index, 2);
    }
}
