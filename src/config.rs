use std::path::Path;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::frontend::Dialect;

pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Knobs of a lineage run. Every field has a default, so a config file only lists overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    pub dialect: Dialect,
    /// Fold unquoted and quoted identifiers to lower case.
    pub case_insensitive: bool,
    /// Maximum nesting of subqueries/ctes followed while building scopes and resolving columns.
    pub max_depth: usize,
    /// Schema attached to table names written without one.
    pub default_schema: Option<String>,
    /// Process statements on the rayon pool before merging them in order.
    pub parallel: bool,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Generic,
            case_insensitive: true,
            max_depth: DEFAULT_MAX_DEPTH,
            default_schema: None,
            parallel: true,
        }
    }
}

impl LineageConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: LineageConfig = toml::from_str(content)
            .map_err(|err| anyhow!("Failed to parse lineage config due to error: {}", err))?;
        if config.max_depth == 0 {
            return Err(anyhow!("`max_depth` must be greater than zero."));
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| anyhow!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
    }
}

/// Folds an identifier when identifiers are case insensitive.
pub fn normalize(ident: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        ident.to_lowercase()
    } else {
        ident.to_owned()
    }
}

/// Folds rendered expression text like [`normalize`] does, string literals keep their case.
pub fn normalize_text(text: &str, case_insensitive: bool) -> String {
    if !case_insensitive {
        return text.to_owned();
    }
    let mut folded = String::with_capacity(text.len());
    let mut in_literal = false;
    for ch in text.chars() {
        if ch == '\'' {
            in_literal = !in_literal;
        }
        if in_literal || ch == '\'' {
            folded.push(ch);
        } else {
            folded.extend(ch.to_lowercase());
        }
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = LineageConfig::from_toml_str(
            r#"
            dialect = "snowflake"
            default_schema = "public"
            "#,
        )
        .unwrap();

        assert_eq!(config.dialect, Dialect::Snowflake);
        assert_eq!(config.default_schema.as_deref(), Some("public"));
        assert!(config.case_insensitive);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn invalid_config() {
        assert!(LineageConfig::from_toml_str("max_depth = 0").is_err());
        assert!(LineageConfig::from_toml_str("dialect = \"cobol\"").is_err());
    }

    #[test]
    fn normalize_respects_case_setting() {
        assert_eq!(normalize("Col1", true), "col1");
        assert_eq!(normalize("Col1", false), "Col1");
    }

    #[test]
    fn normalized_text_keeps_literals() {
        assert_eq!(
            normalize_text("CASE WHEN Col1 = 'It''s A' THEN MAX(B) END", true),
            "case when col1 = 'It''s A' then max(b) end"
        );
        assert_eq!(normalize_text("MAX(Col1)", false), "MAX(Col1)");
    }
}
