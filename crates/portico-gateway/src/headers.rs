//! Header names and header-map plumbing shared by the pipeline stages.

use std::net::SocketAddr;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

/// Header name for request ID.
pub static HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Header name for the tenant organization.
pub static HEADER_ORG_ID: HeaderName = HeaderName::from_static("x-org-id");

/// Header name for the tenant user.
pub static HEADER_USER_ID: HeaderName = HeaderName::from_static("x-user-id");

/// Header name for the tenant API key.
pub static HEADER_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Header name for the forwarded client address chain.
pub static HEADER_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Header name for the host the client originally asked for.
pub static HEADER_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Header name for the scheme the client originally used.
pub static HEADER_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Hop-by-hop headers (RFC 9110 §7.6.1); never forwarded in either direction.
pub static HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Check if a header is hop-by-hop.
pub fn is_hop_by_hop_header(name: &str) -> bool {
    let name_lower = name.to_ascii_lowercase();
    HOP_BY_HOP_HEADERS.contains(&name_lower.as_str())
}

/// Headers named in the `Connection` header are hop-by-hop for this message.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let extra = connection_tokens(headers);
    let mut filtered = HeaderMap::with_capacity(headers.len());

    for (name, value) in headers {
        if is_hop_by_hop_header(name.as_str()) || extra.iter().any(|t| t == name.as_str()) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }

    filtered
}

/// Filter inbound headers for forwarding to the upstream.
///
/// With `change_origin` the client's `Host` is dropped so the HTTP client
/// derives it from the upstream URL.
pub fn filter_headers_for_upstream(headers: &HeaderMap, change_origin: bool) -> HeaderMap {
    let mut filtered = strip_hop_by_hop(headers);
    if change_origin {
        filtered.remove(header::HOST);
    }
    filtered
}

/// Filter upstream response headers before relaying them to the client.
pub fn filter_headers_for_client(headers: &HeaderMap) -> HeaderMap {
    strip_hop_by_hop(headers)
}

/// Add `X-Forwarded-*` metadata for the client connection.
///
/// The peer address is appended to any existing `X-Forwarded-For` chain;
/// host and proto are only set when no earlier proxy set them.
pub fn add_forwarded_headers(headers: &mut HeaderMap, peer: SocketAddr, client_host: Option<&HeaderValue>) {
    let peer_ip = peer.ip().to_string();
    let chain = match headers.get(&HEADER_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {peer_ip}"),
        _ => peer_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(HEADER_FORWARDED_FOR.clone(), value);
    }

    if !headers.contains_key(&HEADER_FORWARDED_HOST) {
        if let Some(host) = client_host {
            headers.insert(HEADER_FORWARDED_HOST.clone(), host.clone());
        }
    }

    if !headers.contains_key(&HEADER_FORWARDED_PROTO) {
        headers.insert(HEADER_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));
    }
}

/// Request ID from the inbound headers, or a fresh UUID v7.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(&HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map_or_else(|| Uuid::now_v7().to_string(), String::from)
}

/// Non-empty string value of a header.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}
