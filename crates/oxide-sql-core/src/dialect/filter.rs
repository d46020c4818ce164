//! Rewrites applied to final SQL before it reaches the driver.

use std::fmt::Debug;

/// A textual SQL rewrite.
pub trait Filter: Send + Sync + Debug {
    /// Rewrites `sql`.
    fn apply(&self, sql: &str) -> String;
}

/// Tracks whether a character position sits inside a literal or quoted identifier.
#[derive(Debug, Default)]
struct Scanner {
    closing: Option<char>,
}

impl Scanner {
    /// Feeds one character; returns true when it is outside any quoted region.
    fn outside(&mut self, ch: char) -> bool {
        match self.closing {
            Some(close) => {
                if ch == close {
                    self.closing = None;
                }
                false
            }
            None => {
                self.closing = match ch {
                    '\'' => Some('\''),
                    '"' => Some('"'),
                    '`' => Some('`'),
                    '[' => Some(']'),
                    _ => None,
                };
                self.closing.is_none()
            }
        }
    }
}

/// Counts `?` placeholders outside literals and quoted identifiers.
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    let mut scanner = Scanner::default();
    sql.chars().filter(|&ch| scanner.outside(ch) && ch == '?').count()
}

/// Replaces `?` with numbered placeholders (`$1`, `:1`, ...).
#[derive(Debug, Clone)]
pub struct SeqFilter {
    pub prefix: &'static str,
    pub start: usize,
}

impl Filter for SeqFilter {
    fn apply(&self, sql: &str) -> String {
        let mut out = String::with_capacity(sql.len() + 8);
        let mut scanner = Scanner::default();
        let mut n = self.start;
        for ch in sql.chars() {
            if scanner.outside(ch) && ch == '?' {
                out.push_str(self.prefix);
                out.push_str(&n.to_string());
                n += 1;
            } else {
                out.push(ch);
            }
        }
        out
    }
}

/// Tags string literals as national (`N'...'`) so NVARCHAR columns keep
/// non-ASCII text.
#[derive(Debug, Clone, Copy)]
pub struct NationalLiteralFilter;

impl Filter for NationalLiteralFilter {
    fn apply(&self, sql: &str) -> String {
        let mut out = String::with_capacity(sql.len() + 8);
        let mut in_literal = false;
        let mut prev: Option<char> = None;
        let mut chars = sql.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if in_literal {
                    if chars.peek() == Some(&'\'') {
                        out.push(ch);
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                        prev = Some('\'');
                        continue;
                    }
                    in_literal = false;
                } else {
                    let tagged = matches!(prev, Some('N' | 'n'));
                    let word_char = prev.is_some_and(|p| p.is_alphanumeric() || p == '_');
                    if !tagged && !word_char {
                        out.push('N');
                    }
                    in_literal = true;
                }
            }
            out.push(ch);
            prev = Some(ch);
        }
        out
    }
}

/// Applies filters in order.
#[must_use]
pub fn apply_filters(filters: &[Box<dyn Filter>], sql: &str) -> String {
    filters
        .iter()
        .fold(sql.to_string(), |acc, filter| filter.apply(&acc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_filter_skips_quoted_regions() {
        let pg = SeqFilter {
            prefix: "$",
            start: 1,
        };
        assert_eq!(
            pg.apply("SELECT * FROM \"t?\" WHERE a = ? AND b = '?' AND c IN (?, ?)"),
            "SELECT * FROM \"t?\" WHERE a = $1 AND b = '?' AND c IN ($2, $3)"
        );
        let oracle = SeqFilter {
            prefix: ":",
            start: 1,
        };
        assert_eq!(oracle.apply("a = ? AND b = ?"), "a = :1 AND b = :2");
    }

    #[test]
    fn test_count_placeholders() {
        assert_eq!(count_placeholders("a = ? AND b = '?' AND [c?] = ?"), 2);
    }

    #[test]
    fn test_national_literals() {
        let f = NationalLiteralFilter;
        assert_eq!(f.apply("WHERE a = 'x' AND b = N'y'"), "WHERE a = N'x' AND b = N'y'");
        assert_eq!(f.apply("a = 'it''s'"), "a = N'it''s'");
    }
}
