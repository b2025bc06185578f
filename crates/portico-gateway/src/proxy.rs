//! HTTP client for forwarding requests to the upstream.

use std::net::{Ipv4Addr, SocketAddr};

use futures_util::TryStreamExt;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, Response, StatusCode};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use reqwest::{redirect, Body, Client, Url};

use crate::body::ResponseBody;
use crate::error::{GatewayError, GatewayResult};
use crate::headers::{add_forwarded_headers, filter_headers_for_client, filter_headers_for_upstream, HEADER_REQUEST_ID};
use crate::stages::{ProxyOptions, TenantContext};

/// HTTP proxy client for the single upstream.
///
/// The underlying connection pool is shared by all requests. Connecting,
/// waiting for a pooled connection, uploading the request body and reading
/// the response head all happen inside the per-request timeout.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    /// HTTP client.
    client: Client,
    /// Upstream base URL.
    upstream: Url,
}

impl ProxyClient {
    /// Create a new proxy client.
    pub fn new(upstream: Url) -> GatewayResult<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(100)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::config(format!("failed to create client: {e}")))?;

        Ok(Self { client, upstream })
    }

    /// Forward a request to the upstream.
    ///
    /// Exactly one attempt is made. Timeouts map to
    /// [`GatewayError::Timeout`], every other transport failure to
    /// [`GatewayError::Upstream`].
    pub async fn forward(&self, request: ProxyRequest) -> GatewayResult<ProxyResponse> {
        let url = self.target_url(&request.path)?;
        let headers = request.outbound_headers();

        let mut builder = self
            .client
            .request(request.method, url)
            .headers(headers)
            .timeout(request.options.timeout);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let stream = response
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(std::io::Error::other);

        Ok(ProxyResponse {
            status,
            headers,
            body: StreamBody::new(stream).boxed_unsync(),
        })
    }

    /// Full upstream URL for a rewritten path (query included).
    pub fn target_url(&self, path: &str) -> GatewayResult<Url> {
        let base = self.upstream.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}"))
            .map_err(|e| GatewayError::upstream(format!("invalid upstream path {path}: {e}")))
    }
}

/// Request to be forwarded to the upstream.
#[derive(Debug)]
pub struct ProxyRequest {
    /// HTTP method.
    pub method: Method,
    /// Rewritten upstream path, including the query string.
    pub path: String,
    /// Inbound request headers.
    pub headers: HeaderMap,
    /// Request body, streamed to the upstream as it arrives. `None` sends
    /// no body at all.
    pub body: Option<Body>,
    /// Resolved tenant identity.
    pub tenant: TenantContext,
    /// Options of the selected route.
    pub options: ProxyOptions,
    /// Address of the connected client.
    pub client_addr: SocketAddr,
    /// Correlation id.
    pub request_id: String,
}

impl ProxyRequest {
    /// Create a new proxy request.
    pub fn new(method: Method, path: impl Into<String>, options: ProxyOptions) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            tenant: TenantContext::default(),
            options,
            client_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            request_id: String::new(),
        }
    }

    /// Set the inbound headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the tenant context.
    #[must_use]
    pub fn with_tenant(mut self, tenant: TenantContext) -> Self {
        self.tenant = tenant;
        self
    }

    /// Set the client address.
    #[must_use]
    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = addr;
        self
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Headers sent upstream.
    ///
    /// Order matters: hop-by-hop filtering, then client metadata, then the
    /// tenant context, which overwrites any same-named client header.
    pub fn outbound_headers(&self) -> HeaderMap {
        let mut headers = filter_headers_for_upstream(&self.headers, self.options.change_origin);

        if self.options.forward_client_for {
            add_forwarded_headers(&mut headers, self.client_addr, self.headers.get(header::HOST));
        }

        self.tenant.apply_to(&mut headers);

        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            if !self.request_id.is_empty() {
                headers.insert(HEADER_REQUEST_ID.clone(), value);
            }
        }

        headers
    }
}

/// Response from the upstream, body still streaming.
pub struct ProxyResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: ResponseBody,
}

impl ProxyResponse {
    /// Turn into a client response, dropping hop-by-hop headers.
    pub fn into_response(self) -> Response<ResponseBody> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = filter_headers_for_client(&self.headers);
        response
    }
}

impl std::fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
