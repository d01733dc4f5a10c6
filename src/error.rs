use std::fmt::Display;

use serde::Serialize;
use thiserror::Error;

/// Hard failures. A failing statement yields no lineage but never aborts the rest of a script.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum LineageError {
    #[error("statement {index} could not be parsed: {message}")]
    FrontEnd { index: usize, message: String },

    #[error("query nesting exceeds the configured limit of {limit}")]
    TooDeeplyNested { limit: usize },

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

/// Best-effort degradations reported next to the partial lineage they affect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    UnresolvedColumn { column: String },
    UnknownQualifier { qualifier: String, column: String },
    UnsupportedStatement { statement: String },
    RecursiveCte { cte: String },
    UnknownColumnOf { relation: String, column: String },
}

impl Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnresolvedColumn { column } => write!(
                f,
                "Could not attribute column `{}` to a single relation in scope.",
                column
            ),
            Warning::UnknownQualifier { qualifier, column } => write!(
                f,
                "Qualifier `{}` of column `{}` names no visible relation.",
                qualifier, column
            ),
            Warning::UnsupportedStatement { statement } => {
                write!(f, "Statement `{}` is not supported, skipping it.", statement)
            }
            Warning::RecursiveCte { cte } => write!(
                f,
                "Cte `{}` references itself, its columns are left unresolved.",
                cte
            ),
            Warning::UnknownColumnOf { relation, column } => {
                write!(f, "Relation `{}` does not expose column `{}`.", relation, column)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, LineageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = LineageError::TooDeeplyNested { limit: 8 };
        assert_eq!(
            err.to_string(),
            "query nesting exceeds the configured limit of 8"
        );

        let warning = Warning::UnknownQualifier {
            qualifier: "t".to_owned(),
            column: "c".to_owned(),
        };
        assert_eq!(
            warning.to_string(),
            "Qualifier `t` of column `c` names no visible relation."
        );
    }
}
