//! Read-only policy checks over a tokenized statement
//!
//! Checks run on `sqlparser` tokens rather than raw text, so a keyword is only
//! a keyword when it is a bare word: `created_at` and `'create new record'`
//! are left alone while `CREATE TABLE x` is refused.

use crate::error::{Nl2SqlError, Result, Violation};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

/// Data-definition, data-modification and administrative words.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE", "EXEC", "EXECUTE",
    "ATTACH", "DETACH", "PRAGMA", "VACUUM",
];

/// Identifier prefixes of stored procedures with no place in an analytic query.
pub const SUSPICIOUS_PREFIXES: &[&str] = &["xp_", "sp_"];

/// Raw sequences refused wherever they appear.
pub const SUSPICIOUS_SEQUENCES: &[&str] = &["@@"];

pub fn tokenize(statement: &str) -> Result<Vec<Token>> {
    let dialect = SQLiteDialect {};
    let mut tokenizer = Tokenizer::new(&dialect, statement);
    tokenizer
        .tokenize()
        .map_err(|e| Nl2SqlError::SyntaxError(format!("could not tokenize statement: {}", e)))
}

/// Tokens that carry meaning.
fn significant(tokens: &[Token]) -> impl Iterator<Item = &Token> {
    tokens.iter().filter(|t| !matches!(t, Token::Whitespace(_)))
}

pub fn check_keywords(tokens: &[Token]) -> Result<()> {
    for token in significant(tokens) {
        if let Token::Word(word) = token {
            if word.quote_style.is_some() {
                continue;
            }
            let upper = word.value.to_ascii_uppercase();
            if BLOCKED_KEYWORDS.contains(&upper.as_str()) {
                return Err(Violation::ForbiddenKeyword(upper).into());
            }
        }
    }
    Ok(())
}

pub fn check_entry_point(tokens: &[Token]) -> Result<()> {
    match significant(tokens).next() {
        Some(Token::Word(word))
            if word.quote_style.is_none() && word.value.eq_ignore_ascii_case("SELECT") =>
        {
            Ok(())
        }
        _ => Err(Violation::NotSelect.into()),
    }
}

/// Raw-text fallback for statements the tokenizer rejects.
pub fn starts_with_select(statement: &str) -> bool {
    statement
        .get(..6)
        .map_or(false, |head| head.eq_ignore_ascii_case("SELECT"))
}

/// `@@`, `xp_`/`sp_` identifiers and SQL comments. String functions used for
/// fuzzy matching (`LIKE`, `UPPER`, `SUBSTR`, ...) are never flagged, and
/// neither is the target table's own name.
pub fn check_injection_patterns(
    statement: &str,
    tokens: &[Token],
    table_name: &str,
) -> Result<()> {
    check_suspicious_sequences(statement)?;

    for token in tokens {
        match token {
            Token::Whitespace(Whitespace::SingleLineComment { prefix, .. }) => {
                return Err(Violation::SuspiciousPattern(prefix.clone()).into());
            }
            Token::Whitespace(Whitespace::MultiLineComment(_)) => {
                return Err(Violation::SuspiciousPattern("/*".to_string()).into());
            }
            Token::Word(word) if word.value.eq_ignore_ascii_case(table_name) => {}
            Token::Word(word) => {
                let lower = word.value.to_ascii_lowercase();
                if let Some(prefix) = SUSPICIOUS_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
                    return Err(Violation::SuspiciousPattern(prefix.to_string()).into());
                }
            }
            _ => {}
        }
    }

    Ok(())
}

pub fn check_suspicious_sequences(statement: &str) -> Result<()> {
    for pattern in SUSPICIOUS_SEQUENCES {
        if statement.contains(pattern) {
            return Err(Violation::SuspiciousPattern(pattern.to_string()).into());
        }
    }
    Ok(())
}

/// The target table must appear as an identifier, quoted or not.
pub fn check_table_reference(tokens: &[Token], table_name: &str) -> Result<()> {
    let referenced = significant(tokens).any(|token| match token {
        Token::Word(word) => word.value.eq_ignore_ascii_case(table_name),
        _ => false,
    });

    if referenced {
        Ok(())
    } else {
        Err(Nl2SqlError::SchemaMismatch {
            table: table_name.to_string(),
        })
    }
}

pub fn check_balanced_parens(tokens: &[Token]) -> Result<()> {
    let open = tokens.iter().filter(|t| matches!(t, Token::LParen)).count();
    let close = tokens.iter().filter(|t| matches!(t, Token::RParen)).count();

    if open == close {
        Ok(())
    } else {
        Err(Nl2SqlError::SyntaxError(format!(
            "SQL query has unbalanced parentheses ({} opening, {} closing)",
            open, close
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(sql: &str) -> Vec<Token> {
        tokenize(sql).unwrap()
    }

    #[test]
    fn test_keywords_are_word_bounded() {
        assert!(check_keywords(&tokens("SELECT created_at, updated_by FROM t")).is_ok());
        let sql = "SELECT * FROM t WHERE note = 'create new record'";
        assert!(check_keywords(&tokens(sql)).is_ok());
        assert!(check_keywords(&tokens("SELECT \"delete\" FROM t")).is_ok());

        let err = check_keywords(&tokens("CREATE TABLE x (a INT)")).unwrap_err();
        assert!(matches!(
            err,
            Nl2SqlError::PolicyViolation(Violation::ForbiddenKeyword(ref k)) if k == "CREATE"
        ));
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let sql = "SELECT 1 FROM t WHERE x IN (select 1); pragma foo";
        let err = check_keywords(&tokens(sql)).unwrap_err();
        assert!(matches!(
            err,
            Nl2SqlError::PolicyViolation(Violation::ForbiddenKeyword(ref k)) if k == "PRAGMA"
        ));
    }

    #[test]
    fn test_entry_point() {
        assert!(check_entry_point(&tokens("select a FROM t")).is_ok());
        assert!(check_entry_point(&tokens("WITH x AS (SELECT 1) SELECT * FROM x")).is_err());
        assert!(check_entry_point(&tokens("\"SELECT\" FROM t")).is_err());
        assert!(check_entry_point(&tokens("")).is_err());
    }

    #[test]
    fn test_fuzzy_functions_allowed() {
        let sql = "SELECT UPPER(a), LOWER(b), SUBSTR(c, 1, 2), TRIM(d), LENGTH(e) \
                   FROM t WHERE a LIKE '%x%'";
        assert!(check_injection_patterns(sql, &tokens(sql), "t").is_ok());
    }

    #[test]
    fn test_suspicious_patterns() {
        let sql = "SELECT @@version FROM t";
        assert!(check_injection_patterns(sql, &[], "t").is_err());

        let sql = "SELECT xp_cmdshell('dir') FROM t";
        let err = check_injection_patterns(sql, &tokens(sql), "t").unwrap_err();
        assert!(matches!(
            err,
            Nl2SqlError::PolicyViolation(Violation::SuspiciousPattern(ref p)) if p == "xp_"
        ));

        // identifiers merely containing the letters are fine
        let sql = "SELECT resp_time FROM t";
        assert!(check_injection_patterns(sql, &tokens(sql), "t").is_ok());
    }

    #[test]
    fn test_target_table_name_exempt_from_prefix_rule() {
        let sql = "SELECT a FROM sp_500_9b247d68";
        assert!(check_injection_patterns(sql, &tokens(sql), "sp_500_9b247d68").is_ok());

        let sql = "SELECT a FROM \"XP_LOG_0a1b2c3d\"";
        assert!(check_injection_patterns(sql, &tokens(sql), "xp_log_0a1b2c3d").is_ok());

        // other prefixed identifiers in the same statement are still refused
        let sql = "SELECT sp_who FROM sp_500_9b247d68";
        let err = check_injection_patterns(sql, &tokens(sql), "sp_500_9b247d68").unwrap_err();
        assert!(matches!(
            err,
            Nl2SqlError::PolicyViolation(Violation::SuspiciousPattern(ref p)) if p == "sp_"
        ));
    }

    #[test]
    fn test_comments_rejected_outside_literals() {
        let sql = "SELECT 1 FROM t -- DROP TABLE t";
        assert!(check_injection_patterns(sql, &tokens(sql), "t").is_err());

        let sql = "SELECT 1 FROM t /* hidden */";
        assert!(check_injection_patterns(sql, &tokens(sql), "t").is_err());

        let sql = "SELECT 1 FROM t WHERE note = 'a -- b'";
        assert!(check_injection_patterns(sql, &tokens(sql), "t").is_ok());
    }

    #[test]
    fn test_table_reference() {
        assert!(check_table_reference(&tokens("SELECT * FROM Sales_AB"), "sales_ab").is_ok());
        assert!(check_table_reference(&tokens("SELECT * FROM \"sales_ab\""), "sales_ab").is_ok());
        assert!(check_table_reference(&tokens("SELECT * FROM main.sales_ab"), "sales_ab").is_ok());

        let err = check_table_reference(&tokens("SELECT * FROM other_table"), "t").unwrap_err();
        assert!(matches!(err, Nl2SqlError::SchemaMismatch { ref table } if table == "t"));
    }

    #[test]
    fn test_balanced_parens_ignore_literals() {
        assert!(check_balanced_parens(&tokens("SELECT COUNT(*) FROM t WHERE a = '(x'")).is_ok());
        assert!(matches!(
            check_balanced_parens(&tokens("SELECT * FROM t WHERE (a = 1")),
            Err(Nl2SqlError::SyntaxError(_))
        ));
    }

    #[test]
    fn test_unterminated_literal_is_syntax_error() {
        assert!(matches!(
            tokenize("SELECT * FROM t WHERE a = 'oops"),
            Err(Nl2SqlError::SyntaxError(_))
        ));
    }
}
