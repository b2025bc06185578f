//! Tenant context resolution.
//!
//! [`TrustedHeaderResolver`] believes whatever tenant headers the client
//! sends. It is a development stand-in: production deployments plug in a
//! [`TenantResolver`] that derives identity from a verified credential.

use std::fmt;

use http::{HeaderMap, HeaderValue};

use crate::headers::{header_str, HEADER_API_KEY, HEADER_ORG_ID, HEADER_USER_ID};
use crate::policy::{DevHeaderDefaults, PolicyConfig};

/// Identity attached to the forwarded request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TenantContext {
    /// Organization id.
    pub org_id: Option<String>,
    /// User id.
    pub user_id: Option<String>,
    /// API key.
    pub api_key: Option<String>,
}

impl TenantContext {
    /// Whether no tenant field is set.
    pub fn is_empty(&self) -> bool {
        self.org_id.is_none() && self.user_id.is_none() && self.api_key.is_none()
    }

    /// Write the context onto outbound headers.
    ///
    /// Tenant headers already present are removed first, so the outbound
    /// request carries exactly the resolved fields and nothing the client
    /// forged. Absent fields produce no header at all.
    pub fn apply_to(&self, outbound: &mut HeaderMap) {
        for (name, value) in [
            (&HEADER_ORG_ID, &self.org_id),
            (&HEADER_USER_ID, &self.user_id),
            (&HEADER_API_KEY, &self.api_key),
        ] {
            outbound.remove(name);
            if let Some(value) = value.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
                outbound.insert(name.clone(), value);
            }
        }
    }
}

impl fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantContext")
            .field("org_id", &self.org_id)
            .field("user_id", &self.user_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Derives the tenant identity for a request.
pub trait TenantResolver: Send + Sync + 'static {
    /// Resolve the tenant from the inbound request headers.
    fn resolve(&self, request_headers: &HeaderMap) -> TenantContext;
}

/// Resolver trusting inbound `X-Org-Id`, `X-User-Id` and `X-Api-Key`.
#[derive(Debug, Clone, Default)]
pub struct TrustedHeaderResolver {
    dev_defaults: Option<DevHeaderDefaults>,
}

impl TrustedHeaderResolver {
    /// Create a resolver, optionally filling gaps from development defaults.
    pub fn new(dev_defaults: Option<DevHeaderDefaults>) -> Self {
        Self { dev_defaults }
    }

    /// Create a resolver from the gateway policy.
    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self::new(policy.dev_header_defaults().cloned())
    }
}

impl TenantResolver for TrustedHeaderResolver {
    fn resolve(&self, request_headers: &HeaderMap) -> TenantContext {
        let inbound = |name| header_str(request_headers, name).map(String::from);

        let mut context = TenantContext {
            org_id: inbound(&HEADER_ORG_ID),
            user_id: inbound(&HEADER_USER_ID),
            api_key: inbound(&HEADER_API_KEY),
        };

        if let Some(ref defaults) = self.dev_defaults {
            context.org_id.get_or_insert_with(|| defaults.org_id.clone());
            context.user_id.get_or_insert_with(|| defaults.user_id.clone());
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_defaults() -> DevHeaderDefaults {
        DevHeaderDefaults {
            org_id: "demo-org".to_string(),
            user_id: "demo-user".to_string(),
        }
    }

    #[test]
    fn test_forwards_only_present_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(&HEADER_ORG_ID, HeaderValue::from_static("org-1"));

        let context = TrustedHeaderResolver::default().resolve(&headers);
        assert_eq!(context.org_id.as_deref(), Some("org-1"));
        assert_eq!(context.user_id, None);
        assert_eq!(context.api_key, None);
    }

    #[test]
    fn test_nothing_synthesized_without_flag() {
        let context = TrustedHeaderResolver::default().resolve(&HeaderMap::new());
        assert!(context.is_empty());
    }

    #[test]
    fn test_dev_defaults_fill_gaps() {
        let mut headers = HeaderMap::new();
        headers.insert(&HEADER_USER_ID, HeaderValue::from_static("alice"));
        headers.insert(&HEADER_API_KEY, HeaderValue::from_static("key-1"));

        let context = TrustedHeaderResolver::new(Some(dev_defaults())).resolve(&headers);
        assert_eq!(context.org_id.as_deref(), Some("demo-org"));
        assert_eq!(context.user_id.as_deref(), Some("alice"));
        assert_eq!(context.api_key.as_deref(), Some("key-1"));
    }

    #[test]
    fn test_blank_header_counts_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(&HEADER_ORG_ID, HeaderValue::from_static(""));

        let context = TrustedHeaderResolver::new(Some(dev_defaults())).resolve(&headers);
        assert_eq!(context.org_id.as_deref(), Some("demo-org"));
    }

    #[test]
    fn test_apply_overrides_and_removes() {
        let mut outbound = HeaderMap::new();
        outbound.insert(&HEADER_ORG_ID, HeaderValue::from_static("forged-org"));
        outbound.insert(&HEADER_API_KEY, HeaderValue::from_static(""));

        let context = TenantContext {
            org_id: Some("org-real".to_string()),
            user_id: Some("user-real".to_string()),
            api_key: None,
        };
        context.apply_to(&mut outbound);

        assert_eq!(outbound.get(&HEADER_ORG_ID).unwrap(), "org-real");
        assert_eq!(outbound.get(&HEADER_USER_ID).unwrap(), "user-real");
        assert!(!outbound.contains_key(&HEADER_API_KEY));
        assert_eq!(outbound.get_all(&HEADER_ORG_ID).iter().count(), 1);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let context = TenantContext {
            api_key: Some("super-secret".to_string()),
            ..TenantContext::default()
        };
        let rendered = format!("{context:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
