//! Route table and path rewriting.
//!
//! Routes are a static, declarative list built once from the policy. A request
//! path selects at most one rule: the most specific prefix that matches on a
//! segment boundary. The selected rule then rewrites the path by stripping its
//! prefix and prepending its upstream prefix.
//!
//! Self-hosted layout (prefix `/n8n`):
//!
//! | Gateway path | Upstream path | Preflight |
//! |---|---|---|
//! | `/n8n/webhook-test/*` | `/webhook-test/*` | yes |
//! | `/n8n/webhook/*` | `/webhook/*` | yes |
//! | `/n8n/*` | `/*` | no |
//!
//! Hosted layout proxies `/n8n/rest`, `/n8n/webhook` and `/n8n/webhook-test`
//! the same way and redirects every other `/n8n` path to the upstream UI.

use std::time::Duration;

use http::Uri;

use crate::config::{DeploymentMode, DEFAULT_ROUTE_PREFIX};
use crate::policy::PolicyConfig;

/// Options applied when proxying through a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyOptions {
    /// Connect plus total response timeout.
    pub timeout: Duration,
    /// Let the upstream see its own `Host`.
    pub change_origin: bool,
    /// Send `X-Forwarded-*` client metadata.
    pub forward_client_for: bool,
}

impl ProxyOptions {
    /// Options with the given timeout, host rewriting and client forwarding on.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            change_origin: true,
            forward_client_for: true,
        }
    }

    /// Options taken from the gateway policy.
    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self {
            timeout: policy.forward_timeout(),
            change_origin: policy.change_origin(),
            forward_client_for: policy.forward_client_for(),
        }
    }
}

/// What a rule does with a matched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// Forward to the upstream.
    Proxy,
    /// Answer with `302 Found` to a fixed location.
    Redirect {
        /// Redirect target.
        location: String,
    },
}

/// A single prefix-to-upstream mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    name: &'static str,
    match_prefix: String,
    upstream_prefix: String,
    action: RouteAction,
    preflight: bool,
    options: ProxyOptions,
}

impl RouteRule {
    /// A proxying rule.
    pub fn proxy(
        name: &'static str,
        match_prefix: impl Into<String>,
        upstream_prefix: impl Into<String>,
        options: ProxyOptions,
    ) -> Self {
        Self {
            name,
            match_prefix: normalize_prefix(match_prefix.into()),
            upstream_prefix: normalize_prefix(upstream_prefix.into()),
            action: RouteAction::Proxy,
            preflight: false,
            options,
        }
    }

    /// A redirecting rule.
    pub fn redirect(
        name: &'static str,
        match_prefix: impl Into<String>,
        location: impl Into<String>,
        options: ProxyOptions,
    ) -> Self {
        Self {
            name,
            match_prefix: normalize_prefix(match_prefix.into()),
            upstream_prefix: String::new(),
            action: RouteAction::Redirect {
                location: location.into(),
            },
            preflight: false,
            options,
        }
    }

    /// Answer `OPTIONS` requests on this rule locally.
    #[must_use]
    pub fn with_preflight(mut self) -> Self {
        self.preflight = true;
        self
    }

    /// Rule name, used in logs and metrics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Gateway prefix this rule matches.
    pub fn match_prefix(&self) -> &str {
        &self.match_prefix
    }

    /// Upstream prefix prepended after stripping.
    pub fn upstream_prefix(&self) -> &str {
        &self.upstream_prefix
    }

    /// What the rule does.
    pub fn action(&self) -> &RouteAction {
        &self.action
    }

    /// Whether preflights on this rule are answered locally.
    pub fn preflight(&self) -> bool {
        self.preflight
    }

    /// Proxy options.
    pub fn options(&self) -> &ProxyOptions {
        &self.options
    }

    /// Whether the path falls under this rule's prefix.
    pub fn matches(&self, path: &str) -> bool {
        prefix_matches(path, &self.match_prefix)
    }

    /// Rewrite a gateway path into the upstream path.
    pub fn rewrite(&self, path: &str) -> String {
        rewrite_path(path, &self.match_prefix, &self.upstream_prefix)
    }
}

/// Drop trailing slashes so `/n8n/` and `/n8n` are the same prefix.
fn normalize_prefix(prefix: String) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.len() == prefix.len() {
        prefix
    } else {
        trimmed.to_string()
    }
}

/// Segment-aware prefix test: `/n8n` matches `/n8n` and `/n8n/x`, not `/n8nx`.
pub fn prefix_matches(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Strip `prefix` from `path` and prepend `replacement`.
///
/// Paths outside the prefix are returned unchanged, so rewriting an
/// already-stripped path is a no-op. An empty result becomes `/`.
pub fn rewrite_path(path: &str, prefix: &str, replacement: &str) -> String {
    let rewritten = if prefix_matches(path, prefix) {
        format!("{replacement}{}", &path[prefix.len()..])
    } else {
        path.to_string()
    };

    if rewritten.is_empty() {
        "/".to_string()
    } else {
        rewritten
    }
}

/// A selected rule plus the upstream path and query for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// Selected rule.
    pub rule: &'a RouteRule,
    /// Rewritten path with the original query string.
    pub upstream_path: String,
}

/// Ordered set of route rules.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    /// Build a table, ordering rules most-specific-first.
    ///
    /// Rules with equal prefix length keep their given order.
    pub fn new(mut rules: Vec<RouteRule>) -> Self {
        rules.sort_by(|a, b| b.match_prefix.len().cmp(&a.match_prefix.len()));
        Self { rules }
    }

    /// Build the table for the policy's deployment mode.
    ///
    /// Without an upstream URL the table is empty and every path is a 404.
    pub fn from_policy(policy: &PolicyConfig) -> Self {
        let Some(upstream) = policy.upstream_base_url() else {
            return Self::default();
        };
        let options = ProxyOptions::from_policy(policy);

        let rules = match policy.deployment_mode() {
            DeploymentMode::SelfHosted => {
                let prefix = policy.route_prefix();
                vec![
                    RouteRule::proxy("webhook-test", format!("{prefix}/webhook-test"), "/webhook-test", options)
                        .with_preflight(),
                    RouteRule::proxy("webhook", format!("{prefix}/webhook"), "/webhook", options)
                        .with_preflight(),
                    RouteRule::proxy("upstream", prefix, "", options),
                ]
            }
            DeploymentMode::Hosted => {
                let prefix = DEFAULT_ROUTE_PREFIX;
                vec![
                    RouteRule::proxy("rest", format!("{prefix}/rest"), "/rest", options),
                    RouteRule::proxy("webhook-test", format!("{prefix}/webhook-test"), "/webhook-test", options)
                        .with_preflight(),
                    RouteRule::proxy("webhook", format!("{prefix}/webhook"), "/webhook", options)
                        .with_preflight(),
                    RouteRule::redirect("ui", prefix, upstream.as_str(), options),
                ]
            }
        };

        Self::new(rules)
    }

    /// First (most specific) rule matching the path.
    pub fn select(&self, path: &str) -> Option<&RouteRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    /// Select a rule for the URI and compute the upstream path and query.
    pub fn route(&self, uri: &Uri) -> Option<RouteMatch<'_>> {
        let rule = self.select(uri.path())?;
        let mut upstream_path = rule.rewrite(uri.path());
        if let Some(query) = uri.query() {
            upstream_path.push('?');
            upstream_path.push_str(query);
        }
        Some(RouteMatch {
            rule,
            upstream_path,
        })
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no route is registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn options() -> ProxyOptions {
        ProxyOptions::new(Duration::from_secs(30))
    }

    fn policy(mode: DeploymentMode) -> PolicyConfig {
        let config = GatewayConfig::builder()
            .upstream_url("https://acme.app.n8n.cloud")
            .deployment_mode(mode)
            .build()
            .unwrap();
        PolicyConfig::from_config(&config).unwrap()
    }

    fn route(table: &RouteTable, uri: &str) -> Option<(&'static str, String)> {
        let uri: Uri = uri.parse().unwrap();
        table
            .route(&uri)
            .map(|m| (m.rule.name(), m.upstream_path))
    }

    #[test]
    fn test_prefix_matches_on_segment_boundary() {
        assert!(prefix_matches("/n8n", "/n8n"));
        assert!(prefix_matches("/n8n/", "/n8n"));
        assert!(prefix_matches("/n8n/rest/health", "/n8n"));
        assert!(!prefix_matches("/n8nx", "/n8n"));
        assert!(!prefix_matches("/n8n/webhook-test/a", "/n8n/webhook"));
        assert!(!prefix_matches("/other", "/n8n"));
    }

    #[test]
    fn test_rewrite_path() {
        assert_eq!(rewrite_path("/n8n/rest/health", "/n8n", ""), "/rest/health");
        assert_eq!(rewrite_path("/n8n", "/n8n", ""), "/");
        assert_eq!(rewrite_path("/n8n/", "/n8n", ""), "/");
        assert_eq!(rewrite_path("/n8n/webhook/abc", "/n8n/webhook", "/webhook"), "/webhook/abc");
        assert_eq!(rewrite_path("/n8n/webhook", "/n8n/webhook", "/webhook"), "/webhook");
    }

    #[test]
    fn test_rewrite_is_noop_on_stripped_paths() {
        assert_eq!(rewrite_path("/", "/n8n", ""), "/");
        assert_eq!(rewrite_path("/rest/health", "/n8n", ""), "/rest/health");
    }

    #[test]
    fn test_table_orders_most_specific_first() {
        let table = RouteTable::new(vec![
            RouteRule::proxy("upstream", "/n8n", "", options()),
            RouteRule::proxy("webhook", "/n8n/webhook", "/webhook", options()),
        ]);

        assert_eq!(table.rules()[0].name(), "webhook");
        assert_eq!(table.select("/n8n/webhook/abc").unwrap().name(), "webhook");
        assert_eq!(table.select("/n8n/rest").unwrap().name(), "upstream");
        assert!(table.select("/elsewhere").is_none());
    }

    #[test]
    fn test_self_hosted_layout() {
        let table = RouteTable::from_policy(&policy(DeploymentMode::SelfHosted));
        assert_eq!(table.len(), 3);

        assert_eq!(
            route(&table, "/n8n/webhook/abc?x=1"),
            Some(("webhook", "/webhook/abc?x=1".to_string()))
        );
        assert_eq!(
            route(&table, "/n8n/webhook-test/abc"),
            Some(("webhook-test", "/webhook-test/abc".to_string()))
        );
        assert_eq!(
            route(&table, "/n8n/rest/health"),
            Some(("upstream", "/rest/health".to_string()))
        );
        assert_eq!(route(&table, "/n8n"), Some(("upstream", "/".to_string())));
        assert_eq!(
            route(&table, "/n8n/assets/index.js"),
            Some(("upstream", "/assets/index.js".to_string()))
        );
        assert_eq!(route(&table, "/api/other"), None);
    }

    #[test]
    fn test_self_hosted_custom_prefix() {
        let config = GatewayConfig::builder()
            .upstream_url("http://n8n:5678")
            .route_prefix("/automation")
            .build()
            .unwrap();
        let table = RouteTable::from_policy(&PolicyConfig::from_config(&config).unwrap());

        assert_eq!(
            route(&table, "/automation/webhook/1"),
            Some(("webhook", "/webhook/1".to_string()))
        );
        assert_eq!(route(&table, "/n8n/webhook/1"), None);
    }

    #[test]
    fn test_hosted_layout() {
        let table = RouteTable::from_policy(&policy(DeploymentMode::Hosted));
        assert_eq!(table.len(), 4);

        assert_eq!(
            route(&table, "/n8n/rest/workflows"),
            Some(("rest", "/rest/workflows".to_string()))
        );
        assert_eq!(
            route(&table, "/n8n/webhook/abc"),
            Some(("webhook", "/webhook/abc".to_string()))
        );

        let ui = table.select("/n8n/workflow/12").unwrap();
        assert_eq!(
            ui.action(),
            &RouteAction::Redirect {
                location: "https://acme.app.n8n.cloud/".to_string()
            }
        );
        assert!(!ui.preflight());
    }

    #[test]
    fn test_no_upstream_means_no_routes() {
        let policy = PolicyConfig::from_config(&GatewayConfig::default()).unwrap();
        let table = RouteTable::from_policy(&policy);
        assert!(table.is_empty());
        assert!(table.select("/n8n/anything").is_none());
    }
}
