//! Portico gateway entry point.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use portico_gateway::logging::{init_logging, LogConfig};
use portico_gateway::{GatewayConfig, GatewayServer};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                    if config.is_none() {
                        eprintln!("--config requires a path");
                        std::process::exit(1);
                    }
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("portico {}", portico_gateway::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Portico - multi-tenant reverse-proxy gateway

USAGE:
    portico [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    PORTICO_LISTEN_ADDR          Listen address (default: 0.0.0.0)
    PORTICO_LISTEN_PORT          Listen port (default: 8080)
    PORTICO_UPSTREAM_URL         Upstream base URL (unset: no proxy routes)
    PORTICO_DEPLOYMENT_MODE      hosted | self-hosted (default: self-hosted)
    PORTICO_ROUTE_PREFIX         Path prefix in self-hosted mode (default: /n8n)
    PORTICO_FORWARD_TIMEOUT_MS   Upstream timeout in milliseconds (default: 30000)
    PORTICO_ALLOWED_ORIGINS      Comma-separated origin allow-list (empty: any)
    PORTICO_ALLOW_DEV_HEADERS    Fill missing tenant headers with dev defaults
    PORTICO_DEV_ORG_ID           Default org id (default: demo-org)
    PORTICO_DEV_USER_ID          Default user id (default: demo-user)
    PORTICO_LOG_LEVEL            Log filter (default: info)
    PORTICO_LOG_FORMAT           json | pretty (default: json)

    When a PORTICO_ variable is unset, these names are read instead:
    PORT, N8N_BASE_URL, API_TIMEOUT_MS, FRONTEND_ORIGIN, ALLOW_DEV_HEADERS,
    DEV_ORG_ID, DEV_USER_ID. Blank dev ids fall back to the defaults.

EXAMPLES:
    # Run with configuration file
    portico --config /etc/portico/gateway.toml

    # Run with environment variables
    PORTICO_UPSTREAM_URL=http://n8n:5678 portico
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => GatewayConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => GatewayConfig::default(),
    }
    .with_env_overrides();

    init_logging(&LogConfig::from(&config.logging)).context("failed to initialise logging")?;

    config.validate().context("invalid configuration")?;

    info!(version = portico_gateway::VERSION, "starting portico");
    if let Some(ref path) = args.config {
        info!(path = %path.display(), "loaded configuration file");
    }

    let server = GatewayServer::new(config).context("failed to create server")?;
    server.run().await.context("server error")?;

    Ok(())
}
