use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::http::{AppState, HttpServer};
use turnstile::ratelimit::{spawn_sweeper, RateLimiter};

/// Fixed-window admission control for web request handlers.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    info!("Starting Turnstile Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.http_addr = addr;
    }
    config.validate()?;
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let policies = config.policy_set()?;
    let client_header = config.rate_limiting.client_header_name()?;
    info!(
        policies = policies.len(),
        client_header = %client_header,
        "Client identity is taken from a forwarding header; the proxy in front must overwrite it"
    );

    // Initialize the rate limiter and its sweeper
    let rate_limiter = Arc::new(RateLimiter::new());
    let sweeper = spawn_sweeper(
        rate_limiter.clone(),
        config.rate_limiting.sweep_interval()?,
        config.rate_limiting.stale_grace_ms,
    );
    info!(
        sweep_interval_secs = config.rate_limiting.sweep_interval_secs,
        stale_grace_ms = config.rate_limiting.stale_grace_ms,
        "Rate limiter initialized"
    );

    let state = AppState::new(rate_limiter, policies).with_client_header(client_header);
    let server = HttpServer::new(config.server.http_addr, state);

    // Run the server with graceful shutdown on Ctrl+C
    let result = server.serve_with_shutdown(shutdown_signal()).await;
    sweeper.abort();
    result?;

    info!("Turnstile Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
