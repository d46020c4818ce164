//! Name mappers between Rust identifiers and SQL identifiers.

use std::fmt::Debug;
use std::sync::Arc;

/// Converts record-type / field names to SQL names and back.
pub trait NameMapper: Send + Sync + Debug {
    /// Rust identifier to SQL identifier.
    fn obj2table(&self, name: &str) -> String;
    /// SQL identifier to Rust identifier.
    fn table2obj(&self, name: &str) -> String;
}

/// Shared mapper handle.
pub type SharedMapper = Arc<dyn NameMapper>;

/// Keeps names unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameMapper;

impl NameMapper for SameMapper {
    fn obj2table(&self, name: &str) -> String {
        name.to_string()
    }

    fn table2obj(&self, name: &str) -> String {
        name.to_string()
    }
}

/// `UserInfo` <-> `user_info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeMapper;

fn snake_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

fn title_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut capitalize_next = true;
    for c in name.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }
    result
}

impl NameMapper for SnakeMapper {
    fn obj2table(&self, name: &str) -> String {
        snake_case(name)
    }

    fn table2obj(&self, name: &str) -> String {
        title_case(name)
    }
}

/// Initialisms kept together by [`GonicMapper`].
const INITIALISMS: &[&str] = &[
    "ACL", "API", "ASCII", "CPU", "CSS", "DNS", "EOF", "GUID", "HTML", "HTTP", "HTTPS", "ID",
    "IP", "JSON", "LHS", "QPS", "RAM", "RHS", "RPC", "SLA", "SMTP", "SQL", "SSH", "TCP", "TLS",
    "TTL", "UDP", "UI", "UID", "UUID", "URI", "URL", "UTF8", "VM", "XML", "XMPP", "XSRF", "XSS",
];

/// Snake case that keeps common initialisms together: `HTTPServerID` <-> `http_server_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GonicMapper;

impl NameMapper for GonicMapper {
    fn obj2table(&self, name: &str) -> String {
        let chars: Vec<char> = name.chars().collect();
        let mut result = String::with_capacity(name.len() + 4);
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_uppercase() {
                let at_boundary = i > 0
                    && (chars[i - 1].is_lowercase()
                        || chars[i - 1].is_ascii_digit()
                        || chars.get(i + 1).is_some_and(|n| n.is_lowercase()));
                if at_boundary && !result.ends_with('_') {
                    result.push('_');
                }
            }
            result.extend(c.to_lowercase());
            i += 1;
        }
        result
    }

    fn table2obj(&self, name: &str) -> String {
        name.split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let upper = part.to_ascii_uppercase();
                if INITIALISMS.contains(&upper.as_str()) {
                    upper
                } else {
                    title_case(part)
                }
            })
            .collect()
    }
}

/// Adds a prefix to the wrapped mapper's output.
#[derive(Debug, Clone)]
pub struct PrefixMapper {
    pub inner: SharedMapper,
    pub prefix: String,
}

impl PrefixMapper {
    #[must_use]
    pub fn new(inner: SharedMapper, prefix: &str) -> Self {
        Self {
            inner,
            prefix: prefix.to_string(),
        }
    }
}

impl NameMapper for PrefixMapper {
    fn obj2table(&self, name: &str) -> String {
        format!("{}{}", self.prefix, self.inner.obj2table(name))
    }

    fn table2obj(&self, name: &str) -> String {
        self.inner
            .table2obj(name.strip_prefix(self.prefix.as_str()).unwrap_or(name))
    }
}

/// Adds a suffix to the wrapped mapper's output.
#[derive(Debug, Clone)]
pub struct SuffixMapper {
    pub inner: SharedMapper,
    pub suffix: String,
}

impl SuffixMapper {
    #[must_use]
    pub fn new(inner: SharedMapper, suffix: &str) -> Self {
        Self {
            inner,
            suffix: suffix.to_string(),
        }
    }
}

impl NameMapper for SuffixMapper {
    fn obj2table(&self, name: &str) -> String {
        format!("{}{}", self.inner.obj2table(name), self.suffix)
    }

    fn table2obj(&self, name: &str) -> String {
        self.inner
            .table2obj(name.strip_suffix(self.suffix.as_str()).unwrap_or(name))
    }
}

/// Resolves a mapper by its configuration name (`same`, `snake`, `gonic`).
#[must_use]
pub fn mapper_by_name(name: &str) -> Option<SharedMapper> {
    match name.to_ascii_lowercase().as_str() {
        "same" => Some(Arc::new(SameMapper)),
        "snake" => Some(Arc::new(SnakeMapper)),
        "gonic" => Some(Arc::new(GonicMapper)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_mapper() {
        assert_eq!(SnakeMapper.obj2table("UserInfo"), "user_info");
        assert_eq!(SnakeMapper.obj2table("name"), "name");
        assert_eq!(SnakeMapper.table2obj("user_info"), "UserInfo");
    }

    #[test]
    fn test_gonic_mapper_keeps_initialisms() {
        assert_eq!(GonicMapper.obj2table("HTTPServerID"), "http_server_id");
        assert_eq!(GonicMapper.obj2table("UserID"), "user_id");
        assert_eq!(GonicMapper.obj2table("Id"), "id");
        assert_eq!(GonicMapper.table2obj("user_id"), "UserID");
        assert_eq!(GonicMapper.table2obj("site_url"), "SiteURL");
    }

    #[test]
    fn test_prefix_and_suffix() {
        let prefix = PrefixMapper::new(Arc::new(SnakeMapper), "t_");
        assert_eq!(prefix.obj2table("UserInfo"), "t_user_info");
        assert_eq!(prefix.table2obj("t_user_info"), "UserInfo");
        let suffix = SuffixMapper::new(Arc::new(SameMapper), "_v1");
        assert_eq!(suffix.obj2table("User"), "User_v1");
        assert_eq!(suffix.table2obj("User_v1"), "User");
    }

    #[test]
    fn test_same_mapper_preserves_case() {
        assert_eq!(SameMapper.obj2table("UserInfo"), "UserInfo");
        assert!(mapper_by_name("GONIC").is_some());
        assert!(mapper_by_name("kebab").is_none());
    }
}
