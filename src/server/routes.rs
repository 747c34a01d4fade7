//! Route dispatch table for the platform API surface.
//!
//! Three patterns are handled by the gateway itself; everything else falls
//! through to the admin-only pass-through. Entries are tried in order.

use crate::models::Lifecycle;

/// What a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// `POST|DELETE /v3/security_groups/{g}/relationships/{running,staging}_spaces[/{s}]`
    BindUnbind,
    /// `GET /v3/security_groups/{g}/relationships/spaces/{s}/check`
    Check,
    /// `GET /v3/security_groups[/{g}]`
    ListGet,
    /// Anything else.
    PassThrough,
}

impl RouteKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BindUnbind => "bind_unbind",
            Self::Check => "check",
            Self::ListGet => "list_get",
            Self::PassThrough => "pass_through",
        }
    }
}

/// A matched route with its captured path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Matched entry.
    pub kind: RouteKind,
    /// Captured GUIDs, in path order.
    pub guids: Vec<String>,
    /// Captured lifecycle, for relationship routes.
    pub lifecycle: Option<Lifecycle>,
}

impl RouteMatch {
    const fn pass_through() -> Self {
        Self {
            kind: RouteKind::PassThrough,
            guids: Vec::new(),
            lifecycle: None,
        }
    }

    /// Returns the `n`th captured GUID.
    #[must_use]
    pub fn guid(&self, n: usize) -> Option<&str> {
        self.guids.get(n).map(String::as_str)
    }
}

#[derive(Clone, Copy)]
enum Segment {
    Literal(&'static str),
    Guid,
    Lifecycle,
}

struct RouteEntry {
    kind: RouteKind,
    methods: &'static [&'static str],
    patterns: &'static [&'static [Segment]],
}

use Segment::{Guid, Lifecycle as Life, Literal};

const SECURITY_GROUPS: Segment = Literal("security_groups");
const V3: Segment = Literal("v3");
const RELATIONSHIPS: Segment = Literal("relationships");

static ROUTES: [RouteEntry; 3] = [
    RouteEntry {
        kind: RouteKind::BindUnbind,
        methods: &["POST", "DELETE"],
        patterns: &[
            &[V3, SECURITY_GROUPS, Guid, RELATIONSHIPS, Life],
            &[V3, SECURITY_GROUPS, Guid, RELATIONSHIPS, Life, Guid],
        ],
    },
    RouteEntry {
        kind: RouteKind::Check,
        methods: &["GET"],
        patterns: &[&[
            V3,
            SECURITY_GROUPS,
            Guid,
            RELATIONSHIPS,
            Literal("spaces"),
            Guid,
            Literal("check"),
        ]],
    },
    RouteEntry {
        kind: RouteKind::ListGet,
        methods: &["GET"],
        patterns: &[&[V3, SECURITY_GROUPS], &[V3, SECURITY_GROUPS, Guid]],
    },
];

/// Matches a request against the table. Unmatched requests pass through.
#[must_use]
pub fn dispatch(method: &str, path: &str) -> RouteMatch {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    ROUTES
        .iter()
        .filter(|entry| entry.methods.contains(&method))
        .find_map(|entry| {
            entry
                .patterns
                .iter()
                .find_map(|pattern| match_pattern(pattern, &segments))
                .map(|(guids, lifecycle)| RouteMatch {
                    kind: entry.kind,
                    guids,
                    lifecycle,
                })
        })
        .filter(|route| valid_for_method(route, method))
        .unwrap_or_else(RouteMatch::pass_through)
}

/// Bind carries the space in the body, unbind in the path.
fn valid_for_method(route: &RouteMatch, method: &str) -> bool {
    match (route.kind, method) {
        (RouteKind::BindUnbind, "POST") => route.guids.len() == 1,
        (RouteKind::BindUnbind, "DELETE") => route.guids.len() == 2,
        _ => true,
    }
}

fn match_pattern(pattern: &[Segment], segments: &[&str]) -> Option<(Vec<String>, Option<Lifecycle>)> {
    if pattern.len() != segments.len() {
        return None;
    }

    let mut guids = Vec::new();
    let mut lifecycle = None;
    for (expected, actual) in pattern.iter().zip(segments) {
        match expected {
            Literal(literal) if literal == actual => {},
            Guid if !actual.is_empty() => guids.push((*actual).to_string()),
            Life => lifecycle = Some(Lifecycle::from_segment(actual)?),
            _ => return None,
        }
    }
    Some((guids, lifecycle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("POST", "/v3/security_groups/g1/relationships/running_spaces", RouteKind::BindUnbind; "bind running")]
    #[test_case("POST", "/v3/security_groups/g1/relationships/staging_spaces", RouteKind::BindUnbind; "bind staging")]
    #[test_case("DELETE", "/v3/security_groups/g1/relationships/staging_spaces/s1", RouteKind::BindUnbind; "unbind")]
    #[test_case("DELETE", "/v3/security_groups/g1/relationships/running_spaces", RouteKind::PassThrough; "unbind without space")]
    #[test_case("POST", "/v3/security_groups/g1/relationships/running_spaces/s1", RouteKind::PassThrough; "bind with space in path")]
    #[test_case("POST", "/v3/security_groups/g1/relationships/other_spaces", RouteKind::PassThrough; "unknown lifecycle")]
    #[test_case("GET", "/v3/security_groups/g1/relationships/spaces/s1/check", RouteKind::Check; "check")]
    #[test_case("POST", "/v3/security_groups/g1/relationships/spaces/s1/check", RouteKind::PassThrough; "check wrong method")]
    #[test_case("GET", "/v3/security_groups", RouteKind::ListGet; "list")]
    #[test_case("GET", "/v3/security_groups/", RouteKind::ListGet; "list trailing slash")]
    #[test_case("GET", "/v3/security_groups/g1", RouteKind::ListGet; "get")]
    #[test_case("POST", "/v3/security_groups", RouteKind::PassThrough; "create group")]
    #[test_case("PATCH", "/v3/security_groups/g1", RouteKind::PassThrough; "update group")]
    #[test_case("GET", "/v3/spaces", RouteKind::PassThrough; "other resource")]
    #[test_case("GET", "/v3/security_groups//x", RouteKind::PassThrough; "empty guid")]
    fn test_dispatch_kind(method: &str, path: &str, expected: RouteKind) {
        assert_eq!(dispatch(method, path).kind, expected);
    }

    #[test]
    fn test_dispatch_captures() {
        let route = dispatch("DELETE", "/v3/security_groups/g1/relationships/staging_spaces/s1");
        assert_eq!(route.guid(0), Some("g1"));
        assert_eq!(route.guid(1), Some("s1"));
        assert_eq!(route.lifecycle, Some(Lifecycle::Staging));

        let route = dispatch("GET", "/v3/security_groups/g1/relationships/spaces/s9/check");
        assert_eq!(route.guids, vec!["g1", "s9"]);
        assert_eq!(route.lifecycle, None);

        assert!(dispatch("GET", "/v3/security_groups").guids.is_empty());
    }
}
