//! Kredo Discovery Service daemon.
//!
//! Serves the public attestation discovery and verification API over a
//! single SQLite-backed store. All write authentication is Ed25519
//! signature verification; the service holds no keys of its own.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use kredo_node::config::{Args, Config};

fn setup_logging(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower_http=info".parse()?);

    match log_format.to_lowercase().as_str() {
        "json" => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
        _ => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_target(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level, &args.log_format)?;

    let config = Config::from_args(&args)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        db_path = %config.db_path.display(),
        bind_addr = %config.bind_addr,
        max_body_bytes = config.max_body_bytes,
        trust_cache_ttl_seconds = config.trust_cache_ttl_seconds,
        "Starting Kredo discovery node"
    );

    let bind_addr = config.bind_addr;
    let app = kredo_node::build_app(config).context("Failed to open the store")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!(%bind_addr, "HTTP API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
    })
    .await
    .context("Server error")?;

    info!("Kredo node stopped");
    Ok(())
}
