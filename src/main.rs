use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::info;

use storefront_api as api;

/// KeyCraft storefront API server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Listen on this port instead of the configured one
    #[arg(long)]
    port: Option<u16>,

    /// Skip seeding the admin account and launch catalog
    #[arg(long)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = api::config::load_config().context("failed to load configuration")?;
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if cli.no_seed {
        cfg.seed_on_start = false;
    }
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!(
        environment = %cfg.environment,
        store = %cfg.store_backend,
        "starting storefront api"
    );

    let state = api::build_state(cfg)
        .await
        .context("failed to initialize application state")?;
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("storefront-api listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
