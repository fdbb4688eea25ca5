//! Cloudbind -- multi-cloud service bootstrap server.
//!
//! Startup sequence: load configuration, snapshot the environment,
//! initialize every enabled service category in bootstrap order, then
//! serve the HTTP surface over the resulting context.  A failed
//! required category aborts startup; a failed optional one leaves its
//! slot empty.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use cloudbind::bootstrap::ServiceInitializer;
use cloudbind::catalog::ProviderCatalog;
use cloudbind::config::{BootstrapEnv, EnvironmentMap};
use cloudbind::diag::DiagnosticRouter;
use cloudbind::services::ServiceCategory;

/// Command-line arguments for the cloudbind server.
#[derive(Parser, Debug)]
#[command(
    name = "cloudbind",
    version,
    about = "Multi-cloud service bootstrap server"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "cloudbind.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from {}", cli.config);
    let config = cloudbind::config::load_config(&cli.config)?;

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    cloudbind::metrics::init_metrics();
    cloudbind::metrics::describe_metrics();
    info!("Prometheus metrics initialized");

    // One immutable environment snapshot for the whole bootstrap.
    let shared = Arc::new(BootstrapEnv {
        config: config.clone(),
        env: EnvironmentMap::capture(),
    });

    let diag = Arc::new(DiagnosticRouter::default());
    let mut initializer =
        ServiceInitializer::new(shared, ProviderCatalog::builtin(), diag);
    initializer.initialize_all().await;

    for result in initializer.results() {
        match &result.message {
            None => info!("{}/{}: ready", result.category, result.provider),
            Some(message) => warn!("{}/{}: {message}", result.category, result.provider),
        }
    }

    // A failed required category is fatal; optional categories degrade
    // to an empty slot.
    for category in ServiceCategory::BOOTSTRAP_ORDER {
        let selection = config.selection(category);
        if !selection.enabled || !selection.required {
            continue;
        }
        if let Some(result) = initializer
            .results()
            .iter()
            .find(|r| r.category == category && !r.success)
        {
            anyhow::bail!(
                "required category {} failed to initialize: {}",
                category,
                result.message.as_deref().unwrap_or("unknown failure")
            );
        }
    }

    let state = Arc::new(initializer.into_context());
    let app = cloudbind::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("cloudbind listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("cloudbind shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
