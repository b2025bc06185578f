//! Process-wide policy resolved once from [`GatewayConfig`].
//!
//! Every pipeline stage reads from a shared `Arc<PolicyConfig>`; nothing
//! re-reads the environment per request.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Url;
use tracing::warn;

use crate::config::{DeploymentMode, GatewayConfig, DEFAULT_DEV_ORG_ID, DEFAULT_DEV_USER_ID};
use crate::error::{GatewayError, GatewayResult};

/// Tenant ids used when development headers are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevHeaderDefaults {
    /// Organization id.
    pub org_id: String,
    /// User id.
    pub user_id: String,
}

/// Immutable gateway policy.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    upstream_base_url: Option<Url>,
    allowed_origins: HashSet<String>,
    deployment_mode: DeploymentMode,
    route_prefix: String,
    dev_header_defaults: Option<DevHeaderDefaults>,
    forward_timeout: Duration,
    change_origin: bool,
    forward_client_for: bool,
}

impl PolicyConfig {
    /// Resolve the policy from validated configuration.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;

        let upstream_base_url = match config.gateway.upstream_url {
            Some(ref url) => Some(
                Url::parse(url)
                    .map_err(|e| GatewayError::config(format!("invalid upstream_url: {e}")))?,
            ),
            None => {
                warn!("no upstream URL configured, proxy routes are disabled");
                None
            }
        };

        // A literal `*` entry means "any origin", same as an empty list.
        let mut allowed_origins: HashSet<String> =
            config.cors.allowed_origins.iter().cloned().collect();
        if allowed_origins.contains("*") {
            allowed_origins.clear();
        }

        let dev_header_defaults = config.tenant.allow_dev_headers.then(|| DevHeaderDefaults {
            org_id: non_blank_or(&config.tenant.dev_org_id, DEFAULT_DEV_ORG_ID),
            user_id: non_blank_or(&config.tenant.dev_user_id, DEFAULT_DEV_USER_ID),
        });

        Ok(Self {
            upstream_base_url,
            allowed_origins,
            deployment_mode: config.gateway.deployment_mode,
            route_prefix: config.gateway.route_prefix.trim_end_matches('/').to_string(),
            dev_header_defaults,
            forward_timeout: config.gateway.forward_timeout,
            change_origin: config.gateway.change_origin,
            forward_client_for: config.gateway.forward_client_for,
        })
    }

    /// Upstream base URL, if configured.
    pub fn upstream_base_url(&self) -> Option<&Url> {
        self.upstream_base_url.as_ref()
    }

    /// Allowed origins. Empty means every origin is allowed.
    pub fn allowed_origins(&self) -> &HashSet<String> {
        &self.allowed_origins
    }

    /// Upstream deployment mode.
    pub fn deployment_mode(&self) -> DeploymentMode {
        self.deployment_mode
    }

    /// Gateway namespace, without a trailing slash.
    pub fn route_prefix(&self) -> &str {
        &self.route_prefix
    }

    /// Development tenant defaults, present only when the flag is on.
    pub fn dev_header_defaults(&self) -> Option<&DevHeaderDefaults> {
        self.dev_header_defaults.as_ref()
    }

    /// Default upstream timeout.
    pub fn forward_timeout(&self) -> Duration {
        self.forward_timeout
    }

    /// Whether the upstream should see its own host.
    pub fn change_origin(&self) -> bool {
        self.change_origin
    }

    /// Whether client address metadata is forwarded.
    pub fn forward_client_for(&self) -> bool {
        self.forward_client_for
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    match value.trim() {
        "" => fallback.to_string(),
        trimmed => trimmed.to_string(),
    }
}
