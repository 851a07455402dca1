//! kube-event-gateway binary
//!
//! Run with: `kube-event-gateway --config config.yaml`
//!
//! Reads the YAML config, validates it (regexes precompiled, receiver
//! references checked), then starts the metrics server, the receiver
//! registry and the cluster event watcher. SIGINT/SIGTERM wind down in
//! order: stop watching, drain in-flight sends, close receivers.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kube_event_gateway::kube::EventHandler;
use kube_event_gateway::{Config, EventWatcher, MetricsServer, ReceiverRegistry, Store};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kube-event-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: std::path::PathBuf,

    /// Address for the metrics/health HTTP server
    #[arg(long, default_value = "0.0.0.0:2112")]
    metrics_address: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    init_logging(&config.log_level, &config.log_format);

    // Fatal on any config invariant violation; validation logs its own
    // deprecation and default warnings.
    config.validate().context("validating configuration")?;

    info!(
        config = %cli.config.display(),
        cluster = config.cluster_name.as_deref().unwrap_or(""),
        receivers = config.receivers.len(),
        "starting kube-event-gateway"
    );

    let store = Arc::new(Store::new(&config.metrics_name_prefix)?);
    let metrics_server = MetricsServer::start(cli.metrics_address, Arc::clone(&store));

    let registry = Arc::new(ReceiverRegistry::from_configs(&config.receivers, Arc::clone(&store))?);

    let route = Arc::new(config.route.clone());
    let dispatch = Arc::clone(&registry);
    let handler: EventHandler = Arc::new(move |event| {
        route.process_event(&event, dispatch.as_ref());
    });

    let client = kube::Client::try_default()
        .await
        .context("connecting to the cluster")?;

    let watcher = EventWatcher::new(client, config.watcher_config(), Arc::clone(&store), handler);
    let watcher_handle = watcher.spawn();

    shutdown_signal().await;

    // Stop ingesting first, then let in-flight sends drain before the
    // receivers release their transports.
    watcher_handle.stop().await;
    registry.close().await;
    metrics_server.abort();

    info!("shutdown complete");
    Ok(())
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
