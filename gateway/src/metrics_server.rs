//! HTTP server for the metrics port
//!
//! Serves the Prometheus text endpoint plus the probe endpoints the
//! deployment manifests point at. Runs on its own task; aborting the
//! handle is the shutdown path.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::metrics::Store;

pub struct MetricsServer;

impl MetricsServer {
    /// Start the metrics server. Returns a JoinHandle that can be
    /// aborted to stop it.
    pub fn start(addr: SocketAddr, store: Arc<Store>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let app = router(store);

            info!(%addr, "metrics server starting");

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, %addr, "failed to bind metrics server");
                    return;
                }
            };

            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "metrics server error");
            }
        })
    }
}

fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/-/healthy", get(probe_handler))
        .route("/-/ready", get(probe_handler))
        .route("/", get(landing_handler))
        .with_state(store)
}

async fn metrics_handler(State(store): State<Arc<Store>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        store.gather(),
    )
}

async fn probe_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn landing_handler() -> impl IntoResponse {
    Html(concat!(
        "<html><head><title>kube-event-gateway</title></head><body>",
        "<h1>kube-event-gateway</h1>",
        "<p>Export Kubernetes events to multiple destinations with routing and filtering.</p>",
        "<ul><li><a href=\"/metrics\">Metrics</a></li></ul>",
        "</body></html>",
    ))
}
