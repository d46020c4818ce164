//! Identifier quoting.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// When identifiers are wrapped in the dialect's delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotePolicy {
    /// Quote every identifier.
    #[default]
    Always,
    /// Quote only reserved words.
    Reserved,
    /// Never quote.
    Never,
}

impl FromStr for QuotePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "reserved" => Ok(Self::Reserved),
            "never" | "none" => Ok(Self::Never),
            other => Err(format!("unknown quote policy `{other}`")),
        }
    }
}

/// Quotes identifiers for one dialect under one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quoter {
    pub prefix: char,
    pub suffix: char,
    pub policy: QuotePolicy,
    /// Upper-case reserved words of the dialect.
    pub reserved: &'static [&'static str],
}

impl Quoter {
    /// Creates a quoter with the `Always` policy.
    #[must_use]
    pub const fn new(prefix: char, suffix: char, reserved: &'static [&'static str]) -> Self {
        Self {
            prefix,
            suffix,
            policy: QuotePolicy::Always,
            reserved,
        }
    }

    /// Same delimiters under another policy.
    #[must_use]
    pub const fn with_policy(self, policy: QuotePolicy) -> Self {
        Self { policy, ..self }
    }

    /// Whether `word` is reserved by the dialect (any case).
    #[must_use]
    pub fn is_reserved(&self, word: &str) -> bool {
        let upper = word.to_ascii_uppercase();
        self.reserved.contains(&upper.as_str())
    }

    fn is_quoted(&self, part: &str) -> bool {
        part.starts_with(self.prefix) && part.ends_with(self.suffix) && part.len() >= 2
    }

    fn quote_part(&self, part: &str, out: &mut String) {
        let wrap = match self.policy {
            QuotePolicy::Always => true,
            QuotePolicy::Reserved => self.is_reserved(part),
            QuotePolicy::Never => false,
        };
        if part == "*" || !wrap || self.is_quoted(part) {
            out.push_str(part);
        } else {
            out.push(self.prefix);
            out.push_str(part);
            out.push(self.suffix);
        }
    }

    fn quote_dotted(&self, name: &str, out: &mut String) {
        for (i, part) in name.split('.').enumerate() {
            if i > 0 {
                out.push('.');
            }
            self.quote_part(part, out);
        }
    }

    /// Quotes an identifier.
    ///
    /// Dotted names are quoted per part, `name AS alias` forms per
    /// identifier, and expressions containing parentheses are left alone.
    #[must_use]
    pub fn quote(&self, name: &str) -> String {
        let name = name.trim();
        let mut out = String::with_capacity(name.len() + 4);
        if name.contains('(') {
            out.push_str(name);
            return out;
        }
        for (i, word) in name.split_whitespace().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            if word.eq_ignore_ascii_case("AS") {
                out.push_str(word);
            } else {
                self.quote_dotted(word, &mut out);
            }
        }
        out
    }

    /// Quotes and joins several identifiers.
    #[must_use]
    pub fn join<S: AsRef<str>>(&self, names: &[S], sep: &str) -> String {
        names
            .iter()
            .map(|n| self.quote(n.as_ref()))
            .collect::<Vec<_>>()
            .join(sep)
    }

    /// Strips delimiters from every part of a (possibly dotted) name.
    #[must_use]
    pub fn trim(&self, name: &str) -> String {
        name.split('.')
            .map(|part| {
                let part = part.trim();
                if self.is_quoted(part) {
                    &part[self.prefix.len_utf8()..part.len() - self.suffix.len_utf8()]
                } else {
                    part
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Rewrites backquoted identifiers in a hand-written fragment into this
    /// dialect's delimiters; text inside single-quoted literals is untouched.
    #[must_use]
    pub fn replace(&self, sql: &str) -> String {
        if self.prefix == '`' && self.policy != QuotePolicy::Never {
            return sql.to_string();
        }
        let mut out = String::with_capacity(sql.len());
        let mut in_literal = false;
        let mut open = false;
        for ch in sql.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(ch);
                }
                '`' if !in_literal => {
                    if self.policy != QuotePolicy::Never {
                        out.push(if open { self.suffix } else { self.prefix });
                    }
                    open = !open;
                }
                c => out.push(c),
            }
        }
        out
    }
}

/// Words reserved by every supported backend.
pub(crate) const COMMON_RESERVED: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLUMN",
    "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE",
    "END", "EXISTS", "FOR", "FOREIGN", "FROM", "FULL", "GROUP", "HAVING", "IN", "INDEX",
    "INNER", "INSERT", "INTO", "IS", "JOIN", "KEY", "LEFT", "LIKE", "NOT", "NULL", "ON", "OR",
    "ORDER", "OUTER", "PRIMARY", "REFERENCES", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO",
    "UNION", "UNIQUE", "UPDATE", "USER", "VALUES", "VIEW", "WHEN", "WHERE", "WITH",
];

#[cfg(test)]
mod tests {
    use super::*;

    const ANSI: Quoter = Quoter::new('"', '"', COMMON_RESERVED);

    #[test]
    fn test_quote_forms() {
        assert_eq!(ANSI.quote("user"), "\"user\"");
        assert_eq!(ANSI.quote("public.user"), "\"public\".\"user\"");
        assert_eq!(ANSI.quote("user AS u"), "\"user\" AS \"u\"");
        assert_eq!(ANSI.quote("u.*"), "\"u\".*");
        assert_eq!(ANSI.quote("count(*)"), "count(*)");
        assert_eq!(ANSI.quote("\"done\""), "\"done\"");
    }

    #[test]
    fn test_reserved_policy() {
        let q = ANSI.with_policy(QuotePolicy::Reserved);
        assert_eq!(q.quote("user"), "\"user\"");
        assert_eq!(q.quote("name"), "name");
        assert_eq!(ANSI.with_policy(QuotePolicy::Never).quote("user"), "user");
    }

    #[test]
    fn test_trim_and_replace() {
        let mssql = Quoter::new('[', ']', COMMON_RESERVED);
        assert_eq!(mssql.trim("[dbo].[user]"), "dbo.user");
        assert_eq!(mssql.replace("`name` = '`x`'"), "[name] = '`x`'");
        assert_eq!(
            ANSI.with_policy(QuotePolicy::Never).replace("`name` = ?"),
            "name = ?"
        );
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Reserved".parse::<QuotePolicy>(), Ok(QuotePolicy::Reserved));
        assert!("sometimes".parse::<QuotePolicy>().is_err());
    }
}
