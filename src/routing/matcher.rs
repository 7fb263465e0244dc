//! Route matching logic.
//!
//! # Responsibilities
//! - Filter candidate patterns by method and host constraints
//! - Match path patterns and capture parameters
//! - Pick the most specific match deterministically
//!
//! # Design Decisions
//! - Host matching is case-insensitive, port ignored
//! - Path matching is case-sensitive
//! - Empty constraint = always matches (wildcard)
//! - All patterns of all routes are sorted once at construction, so lookup
//!   is a linear scan where the first hit is the winner

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use crate::config::model::Route;
use crate::routing::pattern::split_path;

/// Successful lookup result.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    /// Index of the matching pattern within the route.
    pub pattern_index: usize,
    pub params: HashMap<String, String>,
}

#[derive(Debug)]
struct Entry {
    route: Arc<Route>,
    pattern_index: usize,
}

impl Entry {
    fn pattern(&self) -> &crate::config::model::RoutePattern {
        &self.route.patterns[self.pattern_index]
    }
}

/// Immutable lookup table over one generation's routes.
#[derive(Debug)]
pub struct RouteMatcher {
    entries: Vec<Entry>,
}

impl RouteMatcher {
    /// Order every pattern by: literal segment count (descending), then
    /// non-wildcard before wildcard, then declaration order.
    pub fn new(routes: &[Arc<Route>]) -> Self {
        let mut keyed = Vec::new();
        for (route_index, route) in routes.iter().enumerate() {
            for (pattern_index, pattern) in route.patterns.iter().enumerate() {
                let key = (
                    Reverse(pattern.path.literal_count()),
                    pattern.path.has_wildcard(),
                    route_index,
                    pattern_index,
                );
                keyed.push((
                    key,
                    Entry {
                        route: route.clone(),
                        pattern_index,
                    },
                ));
            }
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            entries: keyed.into_iter().map(|(_, entry)| entry).collect(),
        }
    }

    /// Find the route for a request. `None` is the normal "not found" result.
    pub fn find(&self, method: &Method, host: Option<&str>, path: &str) -> Option<RouteMatch> {
        let segments: Vec<&str> = split_path(path).collect();

        self.entries.iter().find_map(|entry| {
            let pattern = entry.pattern();
            if !pattern.accepts_method(method) || !pattern.accepts_host(host) {
                return None;
            }
            pattern.path.matches(&segments).map(|params| RouteMatch {
                route: entry.route.clone(),
                pattern_index: entry.pattern_index,
                params,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RoutePattern;
    use crate::routing::pattern::{HostPattern, PathPattern};

    fn pattern(path: &str, methods: &[Method], host: Option<&str>) -> RoutePattern {
        RoutePattern {
            methods: methods.to_vec(),
            host: host.map(HostPattern::new),
            path: PathPattern::parse(path).unwrap(),
        }
    }

    fn route(id: &str, patterns: Vec<RoutePattern>) -> Arc<Route> {
        Arc::new(Route {
            id: id.into(),
            patterns,
            policies: vec![],
            backend_group: "web".into(),
            timeout: None,
        })
    }

    fn find<'a>(m: &RouteMatcher, method: Method, path: &str) -> Option<String> {
        m.find(&method, None, path).map(|r| r.route.id.clone())
    }

    #[test]
    fn test_literal_beats_param_regardless_of_order() {
        let param = route("by-id", vec![pattern("/users/:id", &[], None)]);
        let literal = route("active", vec![pattern("/users/active", &[], None)]);

        for routes in [
            vec![param.clone(), literal.clone()],
            vec![literal.clone(), param.clone()],
        ] {
            let m = RouteMatcher::new(&routes);
            assert_eq!(find(&m, Method::GET, "/users/active").as_deref(), Some("active"));
            assert_eq!(find(&m, Method::GET, "/users/42").as_deref(), Some("by-id"));
        }
    }

    #[test]
    fn test_wildcard_loses_to_equal_literal_count() {
        let wild = route("wild", vec![pattern("/users/*", &[], None)]);
        let param = route("param", vec![pattern("/users/:id", &[], None)]);
        let m = RouteMatcher::new(&[wild, param]);
        assert_eq!(find(&m, Method::GET, "/users/7").as_deref(), Some("param"));
        assert_eq!(find(&m, Method::GET, "/users/7/orders").as_deref(), Some("wild"));
        assert_eq!(find(&m, Method::GET, "/users").as_deref(), Some("wild"));
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let first = route("first", vec![pattern("/items/:id", &[], None)]);
        let second = route("second", vec![pattern("/items/:sku", &[], None)]);
        let m = RouteMatcher::new(&[first, second]);
        assert_eq!(find(&m, Method::GET, "/items/1").as_deref(), Some("first"));
    }

    #[test]
    fn test_method_constraint() {
        let read = route("read", vec![pattern("/orders/:id", &[Method::GET], None)]);
        let write = route("write", vec![pattern("/orders/:id", &[Method::PUT, Method::PATCH], None)]);
        let m = RouteMatcher::new(&[read, write]);
        assert_eq!(find(&m, Method::GET, "/orders/1").as_deref(), Some("read"));
        assert_eq!(find(&m, Method::PATCH, "/orders/1").as_deref(), Some("write"));
        assert!(find(&m, Method::DELETE, "/orders/1").is_none());
    }

    #[test]
    fn test_host_constraint() {
        let admin = route("admin", vec![pattern("/*", &[], Some("admin.example.com"))]);
        let public = route("public", vec![pattern("/*", &[], None)]);
        let m = RouteMatcher::new(&[admin, public]);
        let hit = m.find(&Method::GET, Some("admin.example.com:8080"), "/x").unwrap();
        assert_eq!(hit.route.id, "admin");
        let miss = m.find(&Method::GET, Some("www.example.com"), "/x").unwrap();
        assert_eq!(miss.route.id, "public");
        let no_host = m.find(&Method::GET, None, "/x").unwrap();
        assert_eq!(no_host.route.id, "public");
    }

    #[test]
    fn test_params_and_pattern_index() {
        let r = route(
            "orders",
            vec![pattern("/orders", &[], None), pattern("/orders/:id/items/:item", &[], None)],
        );
        let m = RouteMatcher::new(&[r]);
        let hit = m.find(&Method::GET, None, "/orders/42/items/7").unwrap();
        assert_eq!(hit.pattern_index, 1);
        assert_eq!(hit.params["id"], "42");
        assert_eq!(hit.params["item"], "7");
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_no_match() {
        let m = RouteMatcher::new(&[route("a", vec![pattern("/a", &[], None)])]);
        assert!(find(&m, Method::GET, "/b").is_none());
        assert!(RouteMatcher::new(&[]).is_empty());
    }
}
