//! Column tag grammar.
//!
//! A tag is a space-separated token list such as
//! `"pk autoincr 'user_id'"` or `"varchar(64) notnull unique(name_email)"`.
//! Whitespace inside quotes or parentheses does not split tokens.

use super::types::SqlType;

/// One recognized tag token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagToken {
    /// `-`: the field is not mapped.
    Skip,
    /// `'name'` or an unrecognized bare word: physical column name.
    Name(String),
    /// Portable SQL type, optionally parameterized.
    Type(SqlType),
    PrimaryKey,
    AutoIncrement,
    Version,
    Created,
    Updated,
    Deleted,
    NotNull,
    Null,
    /// `unique` or `unique(group)`.
    Unique(Option<String>),
    /// `index` or `index(group)`.
    Index(Option<String>),
    /// `default(expr)` or `default expr`.
    Default(String),
    /// `comment('text')`.
    Comment(String),
    /// `extends` or `extends('prefix')`.
    Extends(Option<String>),
    Cache,
    NoCache,
    Utc,
    /// `->`: written to the database, never read back.
    OnlyToDb,
    /// `<-`: read from the database, never written.
    OnlyFromDb,
}

/// Splits a tag into raw tokens.
#[must_use]
pub fn split_tag(tag: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut depth = 0_usize;

    for ch in tag.chars() {
        match ch {
            '\'' => {
                quoted = !quoted;
                current.push(ch);
            }
            '(' if !quoted => {
                depth += 1;
                current.push(ch);
            }
            ')' if !quoted => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c.is_whitespace() && !quoted && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(text: &str) -> String {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        text[1..text.len() - 1].replace("''", "'")
    } else {
        text.to_string()
    }
}

/// Splits `key(args)` into the key and the raw argument text.
fn key_and_args(token: &str) -> (&str, Option<&str>) {
    match (token.find('('), token.ends_with(')')) {
        (Some(open), true) => (&token[..open], Some(&token[open + 1..token.len() - 1])),
        _ => (token, None),
    }
}

fn group(args: Option<&str>) -> Option<String> {
    args.map(unquote).filter(|g| !g.is_empty())
}

/// Parses a tag into tokens.
///
/// # Errors
///
/// Returns a description of the first ill-formed token.
pub fn parse_tag(tag: &str) -> Result<Vec<TagToken>, String> {
    let raw = split_tag(tag);
    let mut tokens = Vec::with_capacity(raw.len());
    let mut iter = raw.iter();

    while let Some(token) = iter.next() {
        let token = token.as_str();
        match token {
            "-" => {
                tokens.push(TagToken::Skip);
                continue;
            }
            "->" => {
                tokens.push(TagToken::OnlyToDb);
                continue;
            }
            "<-" => {
                tokens.push(TagToken::OnlyFromDb);
                continue;
            }
            _ => {}
        }
        if token.starts_with('\'') {
            if !token.ends_with('\'') || token.len() < 2 {
                return Err(format!("unterminated quoted name {token}"));
            }
            tokens.push(TagToken::Name(unquote(token)));
            continue;
        }

        let (key, args) = key_and_args(token);
        let parsed = match key.to_ascii_lowercase().as_str() {
            "pk" => TagToken::PrimaryKey,
            "autoincr" => TagToken::AutoIncrement,
            "version" => TagToken::Version,
            "created" => TagToken::Created,
            "updated" => TagToken::Updated,
            "deleted" => TagToken::Deleted,
            "notnull" => TagToken::NotNull,
            "null" => TagToken::Null,
            "unique" => TagToken::Unique(group(args)),
            "index" => TagToken::Index(group(args)),
            "cache" => TagToken::Cache,
            "nocache" => TagToken::NoCache,
            "utc" => TagToken::Utc,
            "extends" => TagToken::Extends(group(args)),
            "comment" => match args {
                Some(text) => TagToken::Comment(unquote(text)),
                None => match iter.next() {
                    Some(next) => TagToken::Comment(unquote(next)),
                    None => return Err("comment needs a value".to_string()),
                },
            },
            "default" => match args {
                Some(expr) => TagToken::Default(expr.trim().to_string()),
                None => match iter.next() {
                    Some(next) => TagToken::Default(next.clone()),
                    None => return Err("default needs a value".to_string()),
                },
            },
            _ => match SqlType::parse(token) {
                Some(ty) => TagToken::Type(ty),
                None if args.is_some() => {
                    return Err(format!("unknown parameterized token {token}"));
                }
                None => TagToken::Name(token.to_string()),
            },
        };
        tokens.push(parsed);
    }
    Ok(tokens)
}

/// Returns true when the tag contains the given bare keyword (any case).
#[must_use]
pub fn has_keyword(tag: &str, keyword: &str) -> bool {
    split_tag(tag).iter().any(|t| {
        let (key, _) = key_and_args(t);
        key.eq_ignore_ascii_case(keyword)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_quotes_and_parens() {
        assert_eq!(
            split_tag("pk  'user name' comment('a b c') default(1 + 2)"),
            vec!["pk", "'user name'", "comment('a b c')", "default(1 + 2)"]
        );
    }

    #[test]
    fn test_roles_and_type() {
        let tokens = parse_tag("pk autoincr BIGINT 'uid'").unwrap();
        assert_eq!(
            tokens,
            vec![
                TagToken::PrimaryKey,
                TagToken::AutoIncrement,
                TagToken::Type(SqlType::new("BIGINT")),
                TagToken::Name("uid".into()),
            ]
        );
    }

    #[test]
    fn test_lowercase_parameterized_type() {
        let tokens = parse_tag("varchar(25) notnull unique(name_email)").unwrap();
        assert_eq!(tokens[0], TagToken::Type(SqlType::with_len("VARCHAR", 25)));
        assert_eq!(tokens[1], TagToken::NotNull);
        assert_eq!(tokens[2], TagToken::Unique(Some("name_email".into())));
    }

    #[test]
    fn test_default_forms() {
        assert_eq!(
            parse_tag("default('x')").unwrap(),
            vec![TagToken::Default("'x'".into())]
        );
        assert_eq!(
            parse_tag("default 0").unwrap(),
            vec![TagToken::Default("0".into())]
        );
        assert!(parse_tag("default").is_err());
    }

    #[test]
    fn test_directions_and_skip() {
        assert_eq!(parse_tag("->").unwrap(), vec![TagToken::OnlyToDb]);
        assert_eq!(parse_tag("<-").unwrap(), vec![TagToken::OnlyFromDb]);
        assert_eq!(parse_tag("-").unwrap(), vec![TagToken::Skip]);
    }

    #[test]
    fn test_extends_prefix() {
        assert_eq!(
            parse_tag("extends('author_')").unwrap(),
            vec![TagToken::Extends(Some("author_".into()))]
        );
        assert_eq!(parse_tag("extends").unwrap(), vec![TagToken::Extends(None)]);
    }

    #[test]
    fn test_bare_word_is_name() {
        assert_eq!(
            parse_tag("nickname").unwrap(),
            vec![TagToken::Name("nickname".into())]
        );
        assert!(parse_tag("bogus(1)").is_err());
    }

    #[test]
    fn test_has_keyword() {
        assert!(has_keyword("JSON notnull", "json"));
        assert!(has_keyword("extends('p_')", "extends"));
        assert!(!has_keyword("'json'", "json"));
    }
}
