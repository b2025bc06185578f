//! Configuration for the Portico gateway.
//!
//! Configuration is layered: built-in defaults, then an optional TOML or JSON
//! file, then `PORTICO_*` environment variables. The result is validated once
//! and turned into an immutable [`PolicyConfig`](crate::policy::PolicyConfig)
//! before the server starts.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Prefix shared by every environment variable the gateway reads.
pub const ENV_PREFIX: &str = "PORTICO_";

/// Unprefixed variable names accepted when the `PORTICO_` one is unset.
pub const LEGACY_ENV_NAMES: &[(&str, &str)] = &[
    ("LISTEN_PORT", "PORT"),
    ("UPSTREAM_URL", "N8N_BASE_URL"),
    ("FORWARD_TIMEOUT_MS", "API_TIMEOUT_MS"),
    ("ALLOWED_ORIGINS", "FRONTEND_ORIGIN"),
    ("ALLOW_DEV_HEADERS", "ALLOW_DEV_HEADERS"),
    ("DEV_ORG_ID", "DEV_ORG_ID"),
    ("DEV_USER_ID", "DEV_USER_ID"),
];

/// Development org id used when none is configured.
pub const DEFAULT_DEV_ORG_ID: &str = "demo-org";

/// Development user id used when none is configured.
pub const DEFAULT_DEV_USER_ID: &str = "demo-user";

/// Default gateway namespace for the upstream.
pub const DEFAULT_ROUTE_PREFIX: &str = "/n8n";

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and upstream settings.
    pub gateway: GatewaySettings,
    /// Cross-origin settings.
    pub cors: CorsSettings,
    /// Tenant header settings.
    pub tenant: TenantSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl GatewayConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl Into<PathBuf>) -> GatewayResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| GatewayError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid JSON: {e}"))),
            _ => Err(GatewayError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Keys are the unprefixed upper `snake_case` names (`LISTEN_PORT`,
    /// `UPSTREAM_URL`, ...); the lookup receives them with [`ENV_PREFIX`]
    /// prepended. When the prefixed name is unset, the matching name from
    /// [`LEGACY_ENV_NAMES`] is tried; blank legacy values count as unset.
    /// Unparseable values are ignored and the previous value kept.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{ENV_PREFIX}{key}")).or_else(|| {
                LEGACY_ENV_NAMES
                    .iter()
                    .find(|(name, _)| *name == key)
                    .and_then(|(_, legacy)| lookup(legacy))
                    .filter(|value| !value.trim().is_empty())
            })
        };

        if let Some(addr) = get("LISTEN_ADDR") {
            self.gateway.listen_addr = addr;
        }

        if let Some(port) = get("LISTEN_PORT").and_then(|p| p.trim().parse().ok()) {
            self.gateway.listen_port = port;
        }

        if let Some(url) = get("UPSTREAM_URL") {
            let url = url.trim();
            self.gateway.upstream_url = (!url.is_empty()).then(|| url.to_string());
        }

        if let Some(mode) = get("DEPLOYMENT_MODE").and_then(|m| m.parse().ok()) {
            self.gateway.deployment_mode = mode;
        }

        if let Some(prefix) = get("ROUTE_PREFIX") {
            self.gateway.route_prefix = prefix.trim().to_string();
        }

        if let Some(ms) = get("FORWARD_TIMEOUT_MS").and_then(|t| t.trim().parse::<u64>().ok()) {
            self.gateway.forward_timeout = Duration::from_millis(ms);
        }

        if let Some(origins) = get("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = parse_origin_list(&origins);
        }

        if let Some(flag) = get("ALLOW_DEV_HEADERS") {
            self.tenant.allow_dev_headers = flag.trim().eq_ignore_ascii_case("true");
        }

        if let Some(org) = get("DEV_ORG_ID").filter(|v| !v.trim().is_empty()) {
            self.tenant.dev_org_id = org.trim().to_string();
        }

        if let Some(user) = get("DEV_USER_ID").filter(|v| !v.trim().is_empty()) {
            self.tenant.dev_user_id = user.trim().to_string();
        }

        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = get("LOG_FORMAT") {
            self.logging.json = !format.trim().eq_ignore_ascii_case("pretty");
        }

        self
    }

    /// Validate the configuration.
    ///
    /// A missing upstream URL is valid: the gateway then serves health checks
    /// and 404s only.
    pub fn validate(&self) -> GatewayResult<()> {
        if let Some(ref url) = self.gateway.upstream_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(GatewayError::config(
                    "upstream_url must start with http:// or https://",
                ));
            }
            reqwest::Url::parse(url)
                .map_err(|e| GatewayError::config(format!("invalid upstream_url: {e}")))?;
        }

        let prefix = &self.gateway.route_prefix;
        if !prefix.starts_with('/') || prefix.trim_end_matches('/').is_empty() {
            return Err(GatewayError::config(
                "route_prefix must start with '/' and name at least one segment",
            ));
        }

        if self.gateway.forward_timeout.is_zero() {
            return Err(GatewayError::config("forward_timeout must be greater than zero"));
        }

        Ok(())
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origin_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

/// How the upstream is deployed, which decides the route layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    /// Managed upstream: REST and webhook namespaces are proxied, the UI is
    /// reached by redirect.
    Hosted,
    /// Self-managed upstream: everything under the route prefix is proxied.
    #[default]
    SelfHosted,
}

impl DeploymentMode {
    /// Configuration spelling of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosted => "hosted",
            Self::SelfHosted => "self-hosted",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hosted" | "cloud" => Ok(Self::Hosted),
            "self-hosted" | "self_hosted" | "selfhosted" => Ok(Self::SelfHosted),
            other => Err(GatewayError::config(format!(
                "unknown deployment mode: {other}"
            ))),
        }
    }
}

/// Listener and upstream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Port the gateway listens on.
    pub listen_port: u16,
    /// Address to bind to.
    pub listen_addr: String,
    /// Upstream base URL. Proxy routes are only registered when set.
    pub upstream_url: Option<String>,
    /// Upstream deployment mode.
    pub deployment_mode: DeploymentMode,
    /// Gateway namespace stripped before forwarding (self-hosted mode).
    pub route_prefix: String,
    /// Connect plus total response timeout for upstream calls.
    #[serde(with = "humantime_serde")]
    pub forward_timeout: Duration,
    /// Let the upstream see its own host rather than the gateway's.
    pub change_origin: bool,
    /// Send `X-Forwarded-*` client metadata upstream.
    pub forward_client_for: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            listen_addr: "0.0.0.0".to_string(),
            upstream_url: None,
            deployment_mode: DeploymentMode::SelfHosted,
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            forward_timeout: Duration::from_secs(30),
            change_origin: true,
            forward_client_for: true,
        }
    }
}

/// Cross-origin settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    /// Origins allowed to read responses. Empty allows every origin.
    pub allowed_origins: Vec<String>,
}

/// Tenant header settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantSettings {
    /// Fill missing tenant headers with the development defaults.
    pub allow_dev_headers: bool,
    /// Default organization id. Blank means [`DEFAULT_DEV_ORG_ID`].
    pub dev_org_id: String,
    /// Default user id. Blank means [`DEFAULT_DEV_USER_ID`].
    pub dev_user_id: String,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            allow_dev_headers: false,
            dev_org_id: DEFAULT_DEV_ORG_ID.to_string(),
            dev_user_id: DEFAULT_DEV_USER_ID.to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive (e.g. `info`, `portico_gateway=debug`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// Builder for `GatewayConfig`.
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.gateway.listen_port = port;
        self
    }

    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.gateway.listen_addr = addr.into();
        self
    }

    /// Set the upstream URL.
    #[must_use]
    pub fn upstream_url(mut self, url: impl Into<String>) -> Self {
        self.config.gateway.upstream_url = Some(url.into());
        self
    }

    /// Set the deployment mode.
    #[must_use]
    pub fn deployment_mode(mut self, mode: DeploymentMode) -> Self {
        self.config.gateway.deployment_mode = mode;
        self
    }

    /// Set the route prefix.
    #[must_use]
    pub fn route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.gateway.route_prefix = prefix.into();
        self
    }

    /// Set the forward timeout.
    #[must_use]
    pub fn forward_timeout(mut self, timeout: Duration) -> Self {
        self.config.gateway.forward_timeout = timeout;
        self
    }

    /// Add an allowed origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.cors.allowed_origins.push(origin.into());
        self
    }

    /// Enable development tenant headers with the given defaults.
    #[must_use]
    pub fn dev_headers(mut self, org_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.config.tenant.allow_dev_headers = true;
        self.config.tenant.dev_org_id = org_id.into();
        self.config.tenant.dev_user_id = user_id.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GatewayResult<GatewayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Duration (de)serialization accepting `500ms`, `30s`, `2m`, `1h` or bare seconds.
mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        };
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("invalid duration: {s}");
        let number = |n: &str| n.trim().parse::<u64>().map_err(|_| invalid());
        let scaled = |n: &str, factor: u64| number(n)?.checked_mul(factor).ok_or_else(invalid);

        if let Some(stripped) = s.strip_suffix("ms") {
            Ok(Duration::from_millis(number(stripped)?))
        } else if let Some(stripped) = s.strip_suffix('s') {
            Ok(Duration::from_secs(number(stripped)?))
        } else if let Some(stripped) = s.strip_suffix('m') {
            Ok(Duration::from_secs(scaled(stripped, 60)?))
        } else if let Some(stripped) = s.strip_suffix('h') {
            Ok(Duration::from_secs(scaled(stripped, 3600)?))
        } else {
            Ok(Duration::from_secs(number(s)?))
        }
    }
}
