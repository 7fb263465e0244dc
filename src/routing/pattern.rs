//! Path and host pattern grammar.
//!
//! Paths are split on `/` with empty segments dropped, so `/orders/42/` and
//! `/orders//42` both yield `["orders", "42"]`. A pattern segment is one of:
//! - a literal (`orders`)
//! - a named parameter (`:id` or `{id}`) capturing exactly one segment
//! - a wildcard (`*` or `*rest`), only as the last segment, capturing zero or
//!   more remaining segments joined by `/`

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Key under which an unnamed wildcard capture is stored.
pub const WILDCARD_PARAM: &str = "*";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern must start with '/'")]
    MissingLeadingSlash,
    #[error("wildcard must be the last segment")]
    WildcardNotLast,
    #[error("empty parameter name in segment '{0}'")]
    EmptyParamName(String),
    #[error("invalid parameter name '{0}'")]
    InvalidParamName(String),
    #[error("parameter '{0}' is captured more than once")]
    DuplicateParam(String),
    #[error("literal segment '{0}' contains a reserved character")]
    ReservedCharacter(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    wildcard: Option<String>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash);
        }

        let parts: Vec<&str> = split_path(raw).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut wildcard = None;
        let mut seen = Vec::new();

        for (i, part) in parts.iter().enumerate() {
            if let Some(name) = part.strip_prefix('*') {
                if i + 1 != parts.len() {
                    return Err(PatternError::WildcardNotLast);
                }
                let name = if name.is_empty() {
                    WILDCARD_PARAM.to_string()
                } else {
                    check_param_name(name, &mut seen)?
                };
                wildcard = Some(name);
            } else if let Some(name) = part.strip_prefix(':') {
                segments.push(Segment::Param(check_param_name_nonempty(part, name, &mut seen)?));
            } else if part.starts_with('{') && part.ends_with('}') && part.len() >= 2 {
                let name = &part[1..part.len() - 1];
                segments.push(Segment::Param(check_param_name_nonempty(part, name, &mut seen)?));
            } else if part.contains(|c: char| matches!(c, '*' | '{' | '}')) {
                return Err(PatternError::ReservedCharacter(part.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            wildcard,
        })
    }

    /// The pattern as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of literal segments, the primary specificity measure.
    pub fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    pub fn has_wildcard(&self) -> bool {
        self.wildcard.is_some()
    }

    /// Leading literal segments rendered as a path, e.g. `/orders` for
    /// `/orders/:id`. Used for display on the status surface.
    pub fn literal_prefix(&self) -> String {
        let prefix: Vec<&str> = self
            .segments
            .iter()
            .map_while(|s| match s {
                Segment::Literal(l) => Some(l.as_str()),
                Segment::Param(_) => None,
            })
            .collect();
        format!("/{}", prefix.join("/"))
    }

    /// Match pre-split path segments, returning captured parameters.
    pub fn matches(&self, path: &[&str]) -> Option<HashMap<String, String>> {
        let fixed = self.segments.len();
        if self.wildcard.is_some() {
            if path.len() < fixed {
                return None;
            }
        } else if path.len() != fixed {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(l) if l == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }

        if let Some(name) = &self.wildcard {
            params.insert(name.clone(), path[fixed..].join("/"));
        }
        Some(params)
    }
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a request path into its non-empty segments.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn check_param_name_nonempty(
    part: &str,
    name: &str,
    seen: &mut Vec<String>,
) -> Result<String, PatternError> {
    if name.is_empty() {
        return Err(PatternError::EmptyParamName(part.to_string()));
    }
    check_param_name(name, seen)
}

fn check_param_name(name: &str, seen: &mut Vec<String>) -> Result<String, PatternError> {
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PatternError::InvalidParamName(name.to_string()));
    }
    if seen.iter().any(|s| s == name) {
        return Err(PatternError::DuplicateParam(name.to_string()));
    }
    seen.push(name.to_string());
    Ok(name.to_string())
}

/// Host constraint: exact (case-insensitive) or `*.suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Suffix(String),
}

impl HostPattern {
    pub fn new(raw: &str) -> Self {
        let host = raw.to_ascii_lowercase();
        match host.strip_prefix("*.") {
            Some(suffix) => HostPattern::Suffix(format!(".{suffix}")),
            None => HostPattern::Exact(host),
        }
    }

    /// Match a request host; any `:port` suffix is ignored.
    pub fn matches(&self, host: &str) -> bool {
        let host = strip_port(host).to_ascii_lowercase();
        match self {
            HostPattern::Exact(expected) => host == *expected,
            HostPattern::Suffix(suffix) => host.ends_with(suffix.as_str()) && host.len() > suffix.len(),
        }
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<&str> {
        split_path(path).collect()
    }

    #[test]
    fn test_literal_and_param() {
        let p = PathPattern::parse("/orders/:id").unwrap();
        assert_eq!(p.literal_count(), 1);
        let params = p.matches(&segs("/orders/42")).unwrap();
        assert_eq!(params["id"], "42");
        assert!(p.matches(&segs("/orders")).is_none());
        assert!(p.matches(&segs("/orders/42/items")).is_none());
    }

    #[test]
    fn test_brace_params() {
        let p = PathPattern::parse("/v1/models/{model_id}").unwrap();
        let params = p.matches(&segs("/v1/models/gpt")).unwrap();
        assert_eq!(params["model_id"], "gpt");
    }

    #[test]
    fn test_wildcard_matches_remainder() {
        let p = PathPattern::parse("/auth/*").unwrap();
        assert_eq!(p.matches(&segs("/auth")).unwrap()[WILDCARD_PARAM], "");
        assert_eq!(p.matches(&segs("/auth/login/sso")).unwrap()[WILDCARD_PARAM], "login/sso");
        assert!(p.matches(&segs("/users/1")).is_none());

        let named = PathPattern::parse("/static/*file").unwrap();
        assert_eq!(named.matches(&segs("/static/css/a.css")).unwrap()["file"], "css/a.css");
    }

    #[test]
    fn test_root_and_trailing_slash() {
        let root = PathPattern::parse("/").unwrap();
        assert!(root.matches(&segs("/")).is_some());
        assert!(root.matches(&segs("/x")).is_none());

        let p = PathPattern::parse("/health/").unwrap();
        assert!(p.matches(&segs("/health")).is_some());
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(PathPattern::parse("orders").unwrap_err(), PatternError::MissingLeadingSlash);
        assert_eq!(PathPattern::parse("/a/*/b").unwrap_err(), PatternError::WildcardNotLast);
        assert_eq!(
            PathPattern::parse("/a/:").unwrap_err(),
            PatternError::EmptyParamName(":".into())
        );
        assert_eq!(
            PathPattern::parse("/a/:id/:id").unwrap_err(),
            PatternError::DuplicateParam("id".into())
        );
        assert!(matches!(
            PathPattern::parse("/a/b*c").unwrap_err(),
            PatternError::ReservedCharacter(_)
        ));
        assert!(matches!(
            PathPattern::parse("/a/:my-id").unwrap_err(),
            PatternError::InvalidParamName(_)
        ));
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(PathPattern::parse("/orders/:id").unwrap().literal_prefix(), "/orders");
        assert_eq!(PathPattern::parse("/auth/*").unwrap().literal_prefix(), "/auth");
        assert_eq!(PathPattern::parse("/").unwrap().literal_prefix(), "/");
    }

    #[test]
    fn test_host_pattern() {
        let exact = HostPattern::new("API.example.com");
        assert!(exact.matches("api.example.com:8080"));
        assert!(exact.matches("API.EXAMPLE.COM"));
        assert!(!exact.matches("example.com"));

        let suffix = HostPattern::new("*.example.com");
        assert!(suffix.matches("eu.example.com"));
        assert!(!suffix.matches("example.com"));
        assert!(!suffix.matches(".example.com"));

        let v6 = HostPattern::new("[::1]");
        assert!(v6.matches("[::1]:8080"));
    }
}
