//! Origin validation.
//!
//! The gateway decides per request whether the declared `Origin` may read the
//! response. A denied origin is never rejected server-side: the request still
//! runs, the response simply carries no `Access-Control-Allow-Origin`, and the
//! browser blocks the read.
//!
//! | Origin header | Allow-list | Result |
//! |---|---|---|
//! | absent | any | allowed, no CORS headers |
//! | present | empty | allowed, origin echoed, `Vary: Origin` |
//! | present | contains origin | allowed, origin echoed, `Vary: Origin` |
//! | present | lacks origin | denied, no `Access-Control-Allow-Origin` |

use std::collections::HashSet;

use http::{HeaderMap, HeaderValue};

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// Outcome of origin validation for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsDecision {
    /// Whether the origin may read the response.
    pub allowed: bool,
    /// Origin to echo in `Access-Control-Allow-Origin`.
    pub echoed_origin: Option<String>,
    /// Whether `Vary: Origin` must be set.
    pub vary_on_origin: bool,
}

impl CorsDecision {
    /// Evaluate a request origin against the allow-list.
    ///
    /// Membership is byte-exact: no case folding, no trailing-slash
    /// normalisation.
    pub fn evaluate(origin: Option<&str>, allowed_origins: &HashSet<String>) -> Self {
        match origin {
            None => Self {
                allowed: true,
                echoed_origin: None,
                vary_on_origin: false,
            },
            Some(origin) if allowed_origins.is_empty() || allowed_origins.contains(origin) => Self {
                allowed: true,
                echoed_origin: Some(origin.to_string()),
                vary_on_origin: true,
            },
            Some(_) => Self {
                allowed: false,
                echoed_origin: None,
                vary_on_origin: true,
            },
        }
    }

    /// Evaluate the `Origin` header of a request.
    pub fn from_request(request_headers: &HeaderMap, allowed_origins: &HashSet<String>) -> Self {
        Self::evaluate(request_origin(request_headers), allowed_origins)
    }

    /// Write the decision onto response headers.
    ///
    /// Gateway CORS headers replace any the upstream set. When no origin is
    /// echoed, upstream `Access-Control-Allow-Origin` and
    /// `Access-Control-Allow-Credentials` are removed so the decision is the
    /// only source of truth.
    pub fn apply(&self, response_headers: &mut HeaderMap) {
        match self
            .echoed_origin
            .as_deref()
            .and_then(|origin| HeaderValue::from_str(origin).ok())
        {
            Some(origin) => {
                response_headers.insert(headers::ALLOW_ORIGIN, origin);
                response_headers.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
            }
            None => {
                response_headers.remove(headers::ALLOW_ORIGIN);
                response_headers.remove(headers::ALLOW_CREDENTIALS);
            }
        }

        if self.vary_on_origin {
            add_vary_origin(response_headers);
        }
    }
}

/// The request's `Origin`, if present and readable.
pub fn request_origin(request_headers: &HeaderMap) -> Option<&str> {
    request_headers
        .get(headers::ORIGIN)
        .and_then(|v| v.to_str().ok())
}

/// Merge `Origin` into `Vary` without duplicating it.
fn add_vary_origin(response_headers: &mut HeaderMap) {
    let existing: Vec<String> = response_headers
        .get_all(headers::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect();

    if existing
        .iter()
        .any(|token| token == "*" || token.eq_ignore_ascii_case("origin"))
    {
        return;
    }

    let merged = if existing.is_empty() {
        "Origin".to_string()
    } else {
        format!("{}, Origin", existing.join(", "))
    };

    if let Ok(value) = HeaderValue::from_str(&merged) {
        response_headers.insert(headers::VARY, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_list(origins: &[&str]) -> HashSet<String> {
        origins.iter().map(|o| (*o).to_string()).collect()
    }

    #[test]
    fn test_absent_origin_is_allowed_without_headers() {
        let decision = CorsDecision::evaluate(None, &allow_list(&["https://app.example.com"]));
        assert!(decision.allowed);
        assert_eq!(decision.echoed_origin, None);

        let mut response = HeaderMap::new();
        decision.apply(&mut response);
        assert!(!response.contains_key(headers::ALLOW_ORIGIN));
        assert!(!response.contains_key(headers::ALLOW_CREDENTIALS));
        assert!(!response.contains_key(headers::VARY));
    }

    #[test]
    fn test_empty_allow_list_echoes_origin() {
        let decision = CorsDecision::evaluate(Some("https://anything.test"), &HashSet::new());
        assert!(decision.allowed);

        let mut response = HeaderMap::new();
        decision.apply(&mut response);
        assert_eq!(response.get(headers::ALLOW_ORIGIN).unwrap(), "https://anything.test");
        assert_eq!(response.get(headers::ALLOW_CREDENTIALS).unwrap(), "true");
        assert_eq!(response.get(headers::VARY).unwrap(), "Origin");
    }

    #[test]
    fn test_listed_origin_is_echoed() {
        let decision = CorsDecision::evaluate(
            Some("https://app.example.com"),
            &allow_list(&["https://app.example.com", "https://admin.example.com"]),
        );
        assert!(decision.allowed);
        assert_eq!(decision.echoed_origin.as_deref(), Some("https://app.example.com"));
    }

    #[test]
    fn test_unlisted_origin_is_denied_by_omission() {
        let decision = CorsDecision::evaluate(
            Some("https://evil.example.com"),
            &allow_list(&["https://app.example.com"]),
        );
        assert!(!decision.allowed);

        let mut response = HeaderMap::new();
        response.insert(headers::ALLOW_ORIGIN, HeaderValue::from_static("*"));
        decision.apply(&mut response);
        assert!(!response.contains_key(headers::ALLOW_ORIGIN));
        assert_eq!(response.get(headers::VARY).unwrap(), "Origin");
    }

    #[test]
    fn test_membership_is_byte_exact() {
        let list = allow_list(&["https://app.example.com"]);
        assert!(!CorsDecision::evaluate(Some("https://APP.example.com"), &list).allowed);
        assert!(!CorsDecision::evaluate(Some("https://app.example.com/"), &list).allowed);
    }

    #[test]
    fn test_gateway_headers_override_upstream() {
        let decision = CorsDecision::evaluate(Some("https://app.example.com"), &HashSet::new());
        let mut response = HeaderMap::new();
        response.insert(headers::ALLOW_ORIGIN, HeaderValue::from_static("https://other.test"));
        response.insert(headers::VARY, HeaderValue::from_static("Accept-Encoding"));

        decision.apply(&mut response);
        assert_eq!(response.get(headers::ALLOW_ORIGIN).unwrap(), "https://app.example.com");
        assert_eq!(response.get(headers::VARY).unwrap(), "Accept-Encoding, Origin");
    }

    #[test]
    fn test_vary_origin_not_duplicated() {
        let decision = CorsDecision::evaluate(Some("https://app.example.com"), &HashSet::new());
        let mut response = HeaderMap::new();
        response.insert(headers::VARY, HeaderValue::from_static("origin, Accept"));

        decision.apply(&mut response);
        assert_eq!(response.get(headers::VARY).unwrap(), "origin, Accept");
    }
}
