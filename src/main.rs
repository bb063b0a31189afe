// src/main.rs
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use varnish_backend_exporter::{
    config::{load_config, Cli},
    health::Aggregator,
    metrics::MetricsRegistry,
    poller::{PollSettings, Supervisor, TcpConnector, TokioScheduler},
    server::{MetricsHandler, ServerBuilder},
    varnish::Secret,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --version and --help exit here
    let cli = Cli::parse_args();
    let config = load_config(&cli)?;

    init_tracing(config.debug)?;
    info!(
        listen_address = %config.web.listen_address,
        telemetry_path = %config.web.telemetry_path,
        varnish_port = config.varnish.port,
        interval_secs = config.varnish.interval_secs,
        reset = config.varnish.reset,
        director_regex = config.varnish.director_regex.as_deref().unwrap_or(""),
        "Configuration loaded"
    );

    let secret = Secret::from_file(&config.varnish.secret)
        .await
        .with_context(|| format!("Failed to read {}", config.varnish.secret.display()))?;

    let grouping = config.varnish.grouping_mode()?;
    let registry = Arc::new(MetricsRegistry::new(&grouping)?);
    let collector = registry.collector();

    // Metrics endpoint
    let handler = MetricsHandler::new(registry, &config.web.telemetry_path);
    let (metrics_addr, server) = ServerBuilder::new(config.web.socket_addr()?)
        .with_handler(handler)
        .spawn()
        .await?;
    info!(
        "Metrics server listening on http://{}{}",
        metrics_addr, config.web.telemetry_path
    );

    // Varnish poller
    let connector = TcpConnector::localhost(config.varnish.port).await?;
    info!("Polling Varnish at {}", connector.addr());

    let supervisor = Arc::new(Supervisor::new(
        connector,
        TokioScheduler,
        secret,
        Aggregator::new(grouping, config.varnish.listing_policy()),
        collector,
        PollSettings::from_config(&config.varnish),
    ));
    let poller = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await })
    };

    // The accept loop never returns on its own, so the server task ending is fatal.
    let server_failure = tokio::select! {
        _ = shutdown_signal() => None,
        result = server => Some(match result {
            Err(e) => anyhow!("Metrics server task failed: {}", e),
            Ok(()) => anyhow!("Metrics server stopped unexpectedly"),
        }),
    };

    supervisor.shutdown();
    poller.await.context("Varnish poller task failed")?;

    if let Some(err) = server_failure {
        error!("{:#}", err);
        return Err(err);
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("varnish_backend_exporter={}", level).parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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

    info!("Shutdown signal received");
}
