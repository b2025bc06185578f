//! Portico - multi-tenant reverse-proxy gateway for a workflow-automation
//! backend.
//!
//! Every inbound request runs through a fixed pipeline before anything
//! reaches the upstream:
//!
//! ```text
//!   client ──► /healthz? ──yes──► 200 ok
//!                 │
//!                 ▼
//!          origin validation ──► route selection ──► 404 when unmatched
//!                                      │
//!                 ┌────────────────────┼─────────────────────┐
//!                 ▼                    ▼                     ▼
//!        OPTIONS on webhook     hosted UI path          proxy route
//!          204 preflight        302 to upstream     tenant resolution
//!                                                          │
//!                                                          ▼
//!                                              forward (timeout, no retry)
//!                                               streamed reply or 502
//! ```
//!
//! The policy is resolved once at startup from [`GatewayConfig`] (defaults,
//! optional TOML/JSON file, `PORTICO_*` environment overrides) and shared
//! immutably by all connections.
//!
//! # Example Usage
//!
//! ```bash
//! $ PORTICO_UPSTREAM_URL=http://n8n:5678 \
//!   PORTICO_ALLOWED_ORIGINS=https://app.example.com \
//!   portico
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
pub mod config;
pub mod error;
pub mod headers;
pub mod health;
pub mod logging;
pub mod pipeline;
pub mod policy;
pub mod proxy;
pub mod server;
pub mod shutdown;
pub mod stages;

pub use config::{DeploymentMode, GatewayConfig, GatewayConfigBuilder};
pub use error::{ErrorResponse, GatewayError, GatewayResult};
pub use pipeline::{Pipeline, ProxyOutcome};
pub use policy::PolicyConfig;
pub use proxy::{ProxyClient, ProxyRequest, ProxyResponse};
pub use server::GatewayServer;
pub use shutdown::ShutdownSignal;

/// Gateway version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
