//! Pipeline stages.
//!
//! Each stage is a plain value or function that can be exercised without a
//! network. The [`Pipeline`](crate::pipeline::Pipeline) runs them in a fixed
//! order:
//!
//! 1. [`cors`] - Evaluate the request origin into a [`CorsDecision`]
//! 2. [`preflight`] - Answer `OPTIONS` on webhook routes locally
//! 3. [`tenant`] - Resolve the outbound [`TenantContext`]
//! 4. [`routing`] - Select a [`RouteRule`] and rewrite the path

pub mod cors;
pub mod preflight;
pub mod routing;
pub mod tenant;

// Re-export main types
pub use cors::CorsDecision;
pub use routing::{ProxyOptions, RouteAction, RouteMatch, RouteRule, RouteTable};
pub use tenant::{TenantContext, TenantResolver, TrustedHeaderResolver};
