//! Webhook preflight responder.
//!
//! Browsers send an `OPTIONS` preflight before a cross-origin webhook `POST`.
//! The upstream does not answer those reliably, so the gateway answers them
//! itself with `204 No Content` and never contacts the upstream.

use http::{HeaderMap, HeaderValue, Method, Response, StatusCode};

use super::cors::{headers, CorsDecision};
use super::routing::RouteRule;

/// Methods advertised on webhook preflights.
pub const ALLOW_METHODS: &str = "POST, OPTIONS";

/// Headers advertised when the browser does not list the ones it wants.
pub const DEFAULT_ALLOW_HEADERS: &str =
    "Content-Type, Authorization, X-Org-Id, X-User-Id, X-Api-Key, X-Request-Id";

/// Whether the request is a preflight this stage answers.
pub fn is_webhook_preflight(method: &Method, rule: &RouteRule) -> bool {
    method == Method::OPTIONS && rule.preflight()
}

/// Build the preflight response.
///
/// `Access-Control-Allow-Headers` echoes the request's
/// `Access-Control-Request-Headers` verbatim when present.
pub fn respond(request_headers: &HeaderMap, decision: &CorsDecision) -> Response<()> {
    let allow_headers = request_headers
        .get(headers::REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOW_HEADERS));

    let mut response = Response::new(());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let response_headers = response.headers_mut();
    response_headers.insert(headers::ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    response_headers.insert(headers::ALLOW_HEADERS, allow_headers);
    decision.apply(response_headers);

    response
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::stages::routing::ProxyOptions;

    fn webhook_rule() -> RouteRule {
        RouteRule::proxy("webhook", "/n8n/webhook", "/webhook", ProxyOptions::new(Duration::from_secs(5)))
            .with_preflight()
    }

    #[test]
    fn test_is_webhook_preflight() {
        let webhook = webhook_rule();
        let ui = RouteRule::proxy("upstream", "/n8n", "", ProxyOptions::new(Duration::from_secs(5)));

        assert!(is_webhook_preflight(&Method::OPTIONS, &webhook));
        assert!(!is_webhook_preflight(&Method::POST, &webhook));
        assert!(!is_webhook_preflight(&Method::OPTIONS, &ui));
    }

    #[test]
    fn test_preflight_echoes_requested_headers() {
        let mut request = HeaderMap::new();
        request.insert(headers::ORIGIN, HeaderValue::from_static("https://app.example.com"));
        request.insert(headers::REQUEST_HEADERS, HeaderValue::from_static("content-type"));

        let allowed: HashSet<String> = ["https://app.example.com".to_string()].into();
        let decision = CorsDecision::from_request(&request, &allowed);
        let response = respond(&request, &decision);

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let h = response.headers();
        assert_eq!(h.get(headers::ALLOW_ORIGIN).unwrap(), "https://app.example.com");
        assert_eq!(h.get(headers::ALLOW_HEADERS).unwrap(), "content-type");
        assert_eq!(h.get(headers::ALLOW_METHODS).unwrap(), "POST, OPTIONS");
        assert_eq!(h.get(headers::ALLOW_CREDENTIALS).unwrap(), "true");
    }

    #[test]
    fn test_preflight_default_headers() {
        let request = HeaderMap::new();
        let decision = CorsDecision::from_request(&request, &HashSet::new());
        let response = respond(&request, &decision);

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(headers::ALLOW_HEADERS).unwrap(),
            DEFAULT_ALLOW_HEADERS
        );
        assert!(!response.headers().contains_key(headers::ALLOW_ORIGIN));
    }

    #[test]
    fn test_preflight_denied_origin_still_answered() {
        let mut request = HeaderMap::new();
        request.insert(headers::ORIGIN, HeaderValue::from_static("https://evil.example.com"));

        let allowed: HashSet<String> = ["https://app.example.com".to_string()].into();
        let decision = CorsDecision::from_request(&request, &allowed);
        let response = respond(&request, &decision);

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!response.headers().contains_key(headers::ALLOW_ORIGIN));
        assert_eq!(response.headers().get(headers::VARY).unwrap(), "Origin");
    }
}
