//! Formatting cleanup applied to model output before any policy check.

use crate::error::Nl2SqlError;
use crate::prompt::{INVALID_REQUEST_SENTINEL, OUT_OF_SCOPE_SENTINEL};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

const FENCE: &str = "```";

/// Language tags accepted on the same line as the opening fence.
const SQL_FENCE_TAGS: &[&str] = &["sqlite3", "sqlite", "postgresql", "postgres", "mysql", "sql"];

lazy_static! {
    static ref MARKUP_TAG: Regex = Regex::new(r"</?[A-Za-z][A-Za-z0-9_:-]*\s*/?>").unwrap();
    static ref LEAD_IN: Regex = Regex::new(
        r"(?i)^\s*(?:(?:here\s+is|here's|here\s+are)\s+(?:the\s+|your\s+|a\s+)?(?:final\s+)?(?:sqlite\s+|sql\s+)?(?:query|statement|answer)|(?:final\s+)?(?:sqlite\s+query|sql\s+query|sqlite|sql|query|answer|response|output|result))\s*:\s*"
    )
    .unwrap();
}

/// Exact sentinel match on trimmed text.
pub fn sentinel_error(text: &str) -> Option<Nl2SqlError> {
    match text.trim() {
        INVALID_REQUEST_SENTINEL => Some(Nl2SqlError::InvalidRequest),
        OUT_OF_SCOPE_SENTINEL => Some(Nl2SqlError::OutOfScope),
        _ => None,
    }
}

/// Sentinel that survived formatting, e.g. fenced or followed by `;`.
pub fn wrapped_sentinel_error(text: &str) -> Option<Nl2SqlError> {
    let bare = text
        .trim()
        .trim_end_matches(';')
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`');
    sentinel_error(bare)
}

/// Remove an opening fence (with optional language tag) and its closing fence.
/// Anything after the closing fence is commentary and is dropped.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix(FENCE) else {
        return trimmed.strip_suffix(FENCE).unwrap_or(trimmed).trim().to_string();
    };

    let rest = strip_fence_language(rest);
    let body = match rest.find(FENCE) {
        Some(end) => &rest[..end],
        None => rest,
    };
    body.trim().to_string()
}

fn strip_fence_language(rest: &str) -> &str {
    // Tag alone on the fence line: ```sql\n
    if let Some(newline) = rest.find('\n') {
        let first_line = rest[..newline].trim();
        let looks_like_tag = first_line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_+.-".contains(c));
        if looks_like_tag && !first_line.eq_ignore_ascii_case("select") {
            return &rest[newline + 1..];
        }
    }

    // Tag followed by the statement on the same line: ```sql SELECT ...
    let lower = rest.to_ascii_lowercase();
    for tag in SQL_FENCE_TAGS {
        if lower.starts_with(tag) && rest[tag.len()..].starts_with(char::is_whitespace) {
            return &rest[tag.len()..];
        }
    }

    rest
}

/// Drop markup such as `<sql>`, `</answer>` or `<br/>`. Comparisons like
/// `a < b` do not match because a tag name must follow `<` directly.
/// Quoted literals are left untouched.
pub fn strip_markup_tags(text: &str) -> String {
    quoted_runs(text)
        .into_iter()
        .map(|(run, quoted)| {
            if quoted {
                Cow::Borrowed(run)
            } else {
                MARKUP_TAG.replace_all(run, " ")
            }
        })
        .collect()
}

/// Split text into runs outside and inside `'`, `"`, `` ` `` or `[]` quotes.
/// An apostrophe inside a word ("Here's") opens nothing, and an unterminated
/// quote leaves the rest of the text as a plain run.
fn quoted_runs(text: &str) -> Vec<(&str, bool)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match quote {
            Some(open) => {
                let close = if open == '[' { ']' } else { open };
                if c == close {
                    let end = i + c.len_utf8();
                    runs.push((&text[start..end], true));
                    start = end;
                    quote = None;
                }
            }
            None => {
                let opens = match c {
                    '"' | '`' | '[' => true,
                    '\'' => {
                        let next = chars.peek().map(|&(_, n)| n);
                        !(prev.map_or(false, char::is_alphanumeric)
                            && next.map_or(false, char::is_alphabetic))
                    }
                    _ => false,
                };
                if opens {
                    if start < i {
                        runs.push((&text[start..i], false));
                    }
                    start = i;
                    quote = Some(c);
                }
            }
        }
        prev = Some(c);
    }

    if start < text.len() {
        runs.push((&text[start..], false));
    }
    runs
}

/// Remove boilerplate lead-ins ("SQL:", "Here is the query:") until none is left.
pub fn strip_lead_ins(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let mut next = LEAD_IN.replace(&current, "").trim().to_string();
        if next.starts_with(FENCE) {
            next = strip_code_fence(&next);
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Put back the statement opening that was seeded in the prompt.
pub fn restore_prefix(text: &str, prefix: &str) -> String {
    let text = text.trim();
    let prefix = prefix.trim();
    if prefix.is_empty() || starts_with_word(text, prefix) {
        return text.to_string();
    }
    format!("{} {}", prefix, text)
}

fn starts_with_word(text: &str, prefix: &str) -> bool {
    let Some(head) = text.get(..prefix.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(prefix) {
        return false;
    }
    // "SELECT" must not match "SELECTED"
    match text[prefix.len()..].chars().next() {
        Some(c) => {
            !(c.is_alphanumeric() || c == '_')
                || !prefix.ends_with(|p: char| p.is_alphanumeric() || p == '_')
        }
        None => true,
    }
}

/// First non-empty statement. A `;` inside a quoted literal or identifier is
/// not a terminator.
pub fn first_statement(text: &str) -> String {
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(open) => {
                current.push(c);
                let close = if open == '[' { ']' } else { open };
                if c == close {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' | '[' => {
                    quote = Some(c);
                    current.push(c);
                }
                ';' => {
                    if !current.trim().is_empty() {
                        return current.trim().to_string();
                    }
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }

    current.trim().to_string()
}

/// Control characters become spaces and whitespace runs collapse to one space.
pub fn normalize_whitespace(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_with_tag_line() {
        assert_eq!(strip_code_fence("```sql\nSELECT 1 FROM t\n```"), "SELECT 1 FROM t");
        assert_eq!(strip_code_fence("```SQLite\nSELECT 1 FROM t\n```"), "SELECT 1 FROM t");
        assert_eq!(strip_code_fence("```\nSELECT 1 FROM t\n```"), "SELECT 1 FROM t");
    }

    #[test]
    fn test_fence_with_inline_tag() {
        assert_eq!(strip_code_fence("```sql SELECT 1 FROM t```"), "SELECT 1 FROM t");
        assert_eq!(strip_code_fence("```SELECT 1 FROM t```"), "SELECT 1 FROM t");
    }

    #[test]
    fn test_fence_drops_trailing_commentary() {
        let raw = "```sql\nSELECT 1 FROM t;\n```\nThis query returns one.";
        assert_eq!(strip_code_fence(raw), "SELECT 1 FROM t;");
    }

    #[test]
    fn test_select_on_fence_line_is_not_a_tag() {
        assert_eq!(strip_code_fence("```SELECT\n* FROM t\n```"), "SELECT\n* FROM t");
    }

    #[test]
    fn test_lone_trailing_fence() {
        assert_eq!(strip_code_fence("SELECT 1 FROM t\n```"), "SELECT 1 FROM t");
    }

    #[test]
    fn test_markup_tags_removed_but_comparisons_kept() {
        assert_eq!(strip_markup_tags("<sql>SELECT a</sql>").trim(), "SELECT a");
        assert_eq!(strip_markup_tags("a < b AND c > d"), "a < b AND c > d");
        assert_eq!(strip_markup_tags("a<5 AND b>3"), "a<5 AND b>3");
    }

    #[test]
    fn test_markup_tags_inside_literals_kept() {
        assert_eq!(
            strip_markup_tags("<sql>SELECT * FROM t WHERE a = '<b>x</b>'</sql>").trim(),
            "SELECT * FROM t WHERE a = '<b>x</b>'"
        );
        assert_eq!(
            strip_markup_tags("SELECT \"<i>\" FROM t WHERE b = 'it''s <br/>'"),
            "SELECT \"<i>\" FROM t WHERE b = 'it''s <br/>'"
        );
        assert_eq!(
            strip_markup_tags("Here's <sql>SELECT a FROM t WHERE b = 'x'</sql>").trim(),
            "Here's  SELECT a FROM t WHERE b = 'x'"
        );
        assert_eq!(strip_markup_tags("SELECT 'oops <sql>").trim(), "SELECT 'oops");
    }

    #[test]
    fn test_lead_ins_removed() {
        assert_eq!(strip_lead_ins("SQL: SELECT 1"), "SELECT 1");
        assert_eq!(strip_lead_ins("query: SELECT 1"), "SELECT 1");
        assert_eq!(strip_lead_ins("Here is the query:\nSELECT 1"), "SELECT 1");
        assert_eq!(strip_lead_ins("Here's the SQL query: SELECT 1"), "SELECT 1");
        assert_eq!(strip_lead_ins("Answer: SQL: SELECT 1"), "SELECT 1");
        assert_eq!(strip_lead_ins("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_lead_in_followed_by_fence() {
        let raw = "Here is the query:\n```sql\nSELECT 1 FROM t\n```";
        assert_eq!(strip_lead_ins(raw), "SELECT 1 FROM t");
    }

    #[test]
    fn test_restore_prefix() {
        assert_eq!(restore_prefix("SUM(a) FROM t", "SELECT"), "SELECT SUM(a) FROM t");
        assert_eq!(restore_prefix("select a FROM t", "SELECT"), "select a FROM t");
        assert_eq!(restore_prefix("SELECTED_ROWS FROM t", "SELECT"), "SELECT SELECTED_ROWS FROM t");
    }

    #[test]
    fn test_first_statement() {
        assert_eq!(first_statement("SELECT 1; DROP TABLE t;"), "SELECT 1");
        assert_eq!(first_statement(";; SELECT 1 ;"), "SELECT 1");
        assert_eq!(first_statement("SELECT 'a;b' FROM t; x"), "SELECT 'a;b' FROM t");
        assert_eq!(first_statement("SELECT \"c;d\" FROM t"), "SELECT \"c;d\" FROM t");
        assert_eq!(first_statement(""), "");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("SELECT\n\ta  FROM\r\nt"), "SELECT a FROM t");
        assert_eq!(normalize_whitespace("DR\u{0}OP"), "DR OP");
    }

    #[test]
    fn test_wrapped_sentinels() {
        assert!(matches!(
            wrapped_sentinel_error("INVALID_REQUEST;"),
            Some(Nl2SqlError::InvalidRequest)
        ));
        assert!(matches!(wrapped_sentinel_error("'OUT_OF_SCOPE'"), Some(Nl2SqlError::OutOfScope)));
        assert!(wrapped_sentinel_error("SELECT 'OUT_OF_SCOPE'").is_none());
    }
}
