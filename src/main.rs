use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use gitserve::auth::{ShowAll, StaticAuthorizer};
use gitserve::config::{self, Config};
use gitserve::{create_router, GitServer};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "gitserve", about = "Git smart HTTP server")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/gitserve/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Server assembly
// ---------------------------------------------------------------------------

fn build_server(config: &Config) -> Result<GitServer> {
    let mut builder = GitServer::builder(config.server.clone()).repo_filter(ShowAll);

    if config.server.auth {
        builder = builder.authorizer(StaticAuthorizer::new(&config.users, &config.tokens));
        tracing::info!(
            users = config.users.len(),
            tokens = config.tokens.len(),
            "static authorizer configured"
        );
    }
    if config.server.auto_hooks {
        builder = builder.hooks(config.hooks.clone());
    }

    builder.build()
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(config: &Config, server: Arc<GitServer>) -> Result<()> {
    let app = create_router(server);

    let listen_addr: std::net::SocketAddr = config
        .listen
        .parse()
        .context("invalid listen address")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config, "starting gitserve");

    // ---- Server ----
    let server = build_server(&config)?;
    server
        .setup()
        .await
        .context("failed to prepare repository root")?;

    run_http_server(&config, Arc::new(server)).await?;

    tracing::info!("gitserve shut down cleanly");
    Ok(())
}
