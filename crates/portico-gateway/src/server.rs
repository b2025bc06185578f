//! Gateway HTTP server.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http::{Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::body::ResponseBody;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::health;
use crate::pipeline::{describe_metrics, Pipeline};
use crate::policy::PolicyConfig;
use crate::shutdown::ShutdownSignal;

/// Gateway server.
#[derive(Debug)]
pub struct GatewayServer {
    /// Configuration.
    config: Arc<GatewayConfig>,
    /// Request pipeline.
    pipeline: Arc<Pipeline>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let policy = PolicyConfig::from_config(&config)?;
        let pipeline = Pipeline::new(policy)?;
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Create a server around a prepared pipeline.
    pub fn with_pipeline(config: GatewayConfig, pipeline: Pipeline) -> Self {
        describe_metrics();
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }

    /// The request pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Address from `listen_addr` and `listen_port`.
    pub fn socket_addr(&self) -> GatewayResult<SocketAddr> {
        let ip = self
            .config
            .gateway
            .listen_addr
            .parse()
            .map_err(|e| GatewayError::config(format!("invalid listen address: {e}")))?;
        Ok(SocketAddr::new(ip, self.config.gateway.listen_port))
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> GatewayResult<TcpListener> {
        let addr = self.socket_addr()?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::server(format!("failed to bind {addr}: {e}")))
    }

    /// Run until SIGTERM or SIGINT.
    pub async fn run(self) -> GatewayResult<()> {
        let listener = self.bind().await?;
        self.serve(listener, ShutdownSignal::with_os_signals()).await
    }

    /// Serve connections from `listener` until `shutdown` fires.
    ///
    /// After the signal the listener is closed, open connections finish
    /// their in-flight request, and the call returns once they are gone or
    /// the forward timeout elapsed.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> GatewayResult<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "gateway listening");
        match self.pipeline.policy().upstream_base_url() {
            Some(upstream) => info!(
                upstream = %upstream,
                mode = %self.pipeline.policy().deployment_mode(),
                routes = self.pipeline.routes().len(),
                "proxying to upstream"
            ),
            None => warn!("no upstream configured, every routed path answers 404"),
        }

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let pipeline = Arc::clone(&self.pipeline);
                            let shutdown = shutdown.clone();
                            connections.spawn(serve_connection(stream, peer, pipeline, shutdown));
                        }
                        Err(e) => error!(error = %e, "failed to accept connection"),
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                () = shutdown.recv() => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);

        let grace = self.pipeline.policy().forward_timeout();
        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(remaining = connections.len(), "grace period elapsed, closing connections");
            connections.abort_all();
        }

        info!("gateway stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    pipeline: Arc<Pipeline>,
    shutdown: ShutdownSignal,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let pipeline = Arc::clone(&pipeline);
        async move { Ok::<_, Infallible>(handle_request(req, &pipeline, peer).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "connection error");
    }
}

async fn handle_request(req: Request<Incoming>, pipeline: &Pipeline, peer: SocketAddr) -> Response<ResponseBody> {
    if health::is_health_check(req.method(), req.uri().path()) {
        return health::liveness();
    }
    pipeline.handle(req, peer).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = GatewayConfig::builder()
            .listen_addr("127.0.0.1")
            .listen_port(9000)
            .build()
            .unwrap();
        let server = GatewayServer::new(config).unwrap();
        assert_eq!(server.socket_addr().unwrap(), "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_invalid_listen_addr() {
        let mut config = GatewayConfig::default();
        config.gateway.listen_addr = "not-an-ip".to_string();
        let server = GatewayServer::with_pipeline(
            config,
            Pipeline::new(PolicyConfig::from_config(&GatewayConfig::default()).unwrap()).unwrap(),
        );
        assert!(server.socket_addr().is_err());
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let server = GatewayServer::new(GatewayConfig::default()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            server.serve(listener, shutdown),
        )
        .await
        .expect("server did not stop");
        assert!(result.is_ok());
    }
}
