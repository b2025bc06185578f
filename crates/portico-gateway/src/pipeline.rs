//! The request pipeline.
//!
//! Stages run in a fixed order:
//!
//! 1. origin validation ([`CorsDecision`])
//! 2. route selection ([`RouteTable`]), unmatched paths end in `404`
//! 3. preflight answer for `OPTIONS` on webhook routes
//! 4. tenant resolution ([`TenantResolver`])
//! 5. forwarding ([`ProxyClient`]), failures end in `502`
//!
//! The origin decision is written onto every response the pipeline returns,
//! including `404`, `502` and redirects.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Body;
use tracing::{debug, info, warn, Instrument};

use crate::body::{bad_gateway, empty_body, not_found, ResponseBody};
use crate::error::{GatewayError, GatewayResult};
use crate::headers::{request_id, HEADER_REQUEST_ID};
use crate::policy::PolicyConfig;
use crate::proxy::{ProxyClient, ProxyRequest};
use crate::stages::cors::request_origin;
use crate::stages::preflight;
use crate::stages::{CorsDecision, RouteAction, RouteMatch, RouteTable, TenantResolver, TrustedHeaderResolver};

/// Name of the request outcome counter.
pub const REQUESTS_TOTAL: &str = "portico_requests_total";

/// Register metric descriptions with the installed recorder, if any.
pub fn describe_metrics() {
    metrics::describe_counter!(REQUESTS_TOTAL, "Requests handled by the pipeline, by outcome");
}

/// How a request left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// Upstream answered; its response was relayed.
    Forwarded,
    /// Answered locally as a webhook preflight.
    PreflightHandled,
    /// Redirected to the upstream UI.
    Redirected,
    /// No route matched.
    NotFound,
    /// The upstream did not answer within the timeout.
    GatewayTimeout,
    /// Transport failure talking to the upstream.
    GatewayError,
}

impl ProxyOutcome {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forwarded => "forwarded",
            Self::PreflightHandled => "preflight",
            Self::Redirected => "redirected",
            Self::NotFound => "not_found",
            Self::GatewayTimeout => "gateway_timeout",
            Self::GatewayError => "gateway_error",
        }
    }

    fn from_error(err: &GatewayError) -> Self {
        match err {
            GatewayError::Timeout { .. } => Self::GatewayTimeout,
            _ => Self::GatewayError,
        }
    }
}

/// Ordered request pipeline over immutable shared state.
pub struct Pipeline {
    policy: Arc<PolicyConfig>,
    routes: RouteTable,
    resolver: Arc<dyn TenantResolver>,
    proxy: Option<ProxyClient>,
}

impl Pipeline {
    /// Build the pipeline for a policy, resolving tenants from trusted headers.
    pub fn new(policy: PolicyConfig) -> GatewayResult<Self> {
        let proxy = policy
            .upstream_base_url()
            .map(|url| ProxyClient::new(url.clone()))
            .transpose()?;
        let routes = RouteTable::from_policy(&policy);
        let resolver = Arc::new(TrustedHeaderResolver::from_policy(&policy));

        Ok(Self {
            policy: Arc::new(policy),
            routes,
            resolver,
            proxy,
        })
    }

    /// Replace the tenant resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl TenantResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// The policy the pipeline was built from.
    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Registered routes.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Run one request through the pipeline.
    ///
    /// Never fails: every failure is mapped to a response. The inbound body
    /// is streamed to the upstream as it arrives, and the returned body may
    /// still be streaming back from it.
    pub async fn handle<B>(&self, request: Request<B>, peer: SocketAddr) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let start = Instant::now();
        let request_id = request_id(request.headers());
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
            peer = %peer,
        );

        async move {
            let decision = CorsDecision::from_request(request.headers(), self.policy.allowed_origins());
            if !decision.allowed {
                debug!(
                    origin = request_origin(request.headers()).unwrap_or_default(),
                    "origin not in allow-list"
                );
            }

            let (outcome, mut response) = self.dispatch(request, peer, &request_id, &decision).await;

            decision.apply(response.headers_mut());
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(HEADER_REQUEST_ID.clone(), value);
            }

            metrics::counter!(REQUESTS_TOTAL, "outcome" => outcome.as_str()).increment(1);
            info!(
                status = response.status().as_u16(),
                outcome = outcome.as_str(),
                duration_ms = start.elapsed().as_millis() as u64,
                "request completed"
            );

            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch<B>(
        &self,
        request: Request<B>,
        peer: SocketAddr,
        request_id: &str,
        decision: &CorsDecision,
    ) -> (ProxyOutcome, Response<ResponseBody>)
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let Some(RouteMatch { rule, upstream_path }) = self.routes.route(request.uri()) else {
            debug!("no route matched");
            return (ProxyOutcome::NotFound, not_found());
        };
        debug!(route = rule.name(), upstream_path = %upstream_path, "route selected");

        if preflight::is_webhook_preflight(request.method(), rule) {
            let response = preflight::respond(request.headers(), decision).map(|()| empty_body());
            return (ProxyOutcome::PreflightHandled, response);
        }

        let proxy = match (rule.action(), &self.proxy) {
            (RouteAction::Redirect { location }, _) => {
                return (ProxyOutcome::Redirected, redirect(location));
            }
            (RouteAction::Proxy, Some(proxy)) => proxy,
            (RouteAction::Proxy, None) => {
                warn!("proxy route without an upstream client");
                return (ProxyOutcome::GatewayError, bad_gateway());
            }
        };

        let tenant = self.resolver.resolve(request.headers());
        let options = *rule.options();

        let (parts, body) = request.into_parts();
        let mut proxy_request = ProxyRequest::new(parts.method, upstream_path, options)
            .with_headers(parts.headers)
            .with_tenant(tenant)
            .with_client_addr(peer)
            .with_request_id(request_id);

        // A stalled or broken upload surfaces as a forward failure, bounded by
        // the route timeout.
        if !body.is_end_stream() {
            proxy_request = proxy_request.with_body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        match proxy.forward(proxy_request).await {
            Ok(response) => {
                debug!(status = response.status.as_u16(), "upstream responded");
                (ProxyOutcome::Forwarded, response.into_response())
            }
            Err(e) => {
                warn!(error = %e, category = e.category(), "upstream request failed");
                (ProxyOutcome::from_error(&e), bad_gateway())
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("policy", &self.policy)
            .field("routes", &self.routes)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

fn redirect(location: &str) -> Response<ResponseBody> {
    match HeaderValue::from_str(location) {
        Ok(location) => {
            let mut response = Response::new(empty_body());
            *response.status_mut() = StatusCode::FOUND;
            response.headers_mut().insert(header::LOCATION, location);
            response
        }
        Err(_) => bad_gateway(),
    }
}
