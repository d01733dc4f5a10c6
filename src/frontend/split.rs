use sqlparser::{
    dialect::Dialect,
    tokenizer::{Location, Token, Tokenizer},
};

/// Splits a script into statement texts on top-level `;`.
///
/// Semicolons inside string literals, quoted identifiers and comments do not split. When the
/// script cannot be tokenized at all, splitting falls back to every `;` so that the front end
/// can still report the offending statement on its own.
pub fn split_statements<'s>(dialect: &dyn Dialect, sql: &'s str) -> Vec<&'s str> {
    let tokens = match Tokenizer::new(dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(err) => {
            log::debug!("Could not tokenize script ({}), splitting on every `;`.", err);
            return sql
                .split(';')
                .map(str::trim)
                .filter(|statement| !statement.is_empty())
                .collect();
        }
    };

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(idx, _)| idx + 1))
        .collect();

    let mut statements = vec![];
    let mut start = 0;
    let mut has_content = false;
    for token in tokens {
        match token.token {
            Token::SemiColon => {
                let end = byte_offset(sql, &line_starts, token.span.start);
                if has_content {
                    statements.push(sql[start..end].trim());
                }
                start = end + 1;
                has_content = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => has_content = true,
        }
    }
    if has_content {
        statements.push(sql[start..].trim());
    }
    statements
}

/// Converts a 1-based (line, character column) location into a byte offset of `sql`.
fn byte_offset(sql: &str, line_starts: &[usize], location: Location) -> usize {
    let Some(&line_start) = line_starts.get((location.line as usize).saturating_sub(1)) else {
        return sql.len();
    };
    sql[line_start..]
        .char_indices()
        .nth((location.column as usize).saturating_sub(1))
        .map(|(idx, _)| line_start + idx)
        .unwrap_or(sql.len())
}

#[cfg(test)]
mod tests {
    use sqlparser::dialect::GenericDialect;

    use super::*;

    #[test]
    fn splits_on_top_level_semicolons() {
        let sql = "SELECT 1;\n  SELECT ';' AS s -- trailing ; comment\n;\n/* ; */ SELECT 3";
        let statements = split_statements(&GenericDialect {}, sql);
        assert_eq!(
            statements,
            vec![
                "SELECT 1",
                "SELECT ';' AS s -- trailing ; comment",
                "/* ; */ SELECT 3"
            ]
        );
    }

    #[test]
    fn skips_empty_statements() {
        let statements = split_statements(&GenericDialect {}, ";; -- nothing\n ;");
        assert!(statements.is_empty());
    }

    #[test]
    fn multibyte_text_before_semicolon() {
        let statements = split_statements(&GenericDialect {}, "SELECT 'é' AS c; SELECT 2");
        assert_eq!(statements, vec!["SELECT 'é' AS c", "SELECT 2"]);
    }

    #[test]
    fn untokenizable_script_falls_back() {
        let statements = split_statements(&GenericDialect {}, "SELECT 'open; SELECT 2");
        assert_eq!(statements, vec!["SELECT 'open", "SELECT 2"]);
    }
}
