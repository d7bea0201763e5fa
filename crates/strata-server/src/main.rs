//! Entry point for the Strata GraphQL server.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use strata_core::config::StrataConfig;
use strata_events::SubscriptionManager;
use strata_graph::{GraphClient, GraphConfig};
use strata_server::{build_router, build_schema};
use strata_service::GraphService;

#[derive(Parser)]
#[command(name = "strata-server")]
#[command(about = "Schema-governed graph service over GraphQL")]
struct Cli {
    /// Config file prefix (default: strata).
    #[arg(short, long, default_value = "strata")]
    config: String,

    /// Override the listen port from config.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("STRATA_LOG_JSON").is_ok_and(|v| v == "1") {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let config = StrataConfig::load(&cli.config)?;
    tracing::info!(graph = ?config.graph, "Configuration loaded");

    let graph_config = GraphConfig::from_settings(&config.graph, &config.retry);
    let client = GraphClient::connect(&graph_config).await?;
    client.bootstrap().await?;

    let events = SubscriptionManager::from_settings(&config.subscriptions);
    let service = GraphService::new(Arc::new(client), events.clone(), config.request.clone());
    let app = build_router(build_schema(service));

    let port = cli.port.unwrap_or(config.server.port);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(events))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM, after ending every open subscription
/// so websocket connections can drain.
async fn shutdown_signal(events: SubscriptionManager) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown requested, closing subscriptions");
    events.close_all();
}
