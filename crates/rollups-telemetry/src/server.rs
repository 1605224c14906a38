//! HTTP exposition of the node's metrics.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::watch;
use tracing::{error, info};

use crate::{Metrics, TelemetryError};

async fn metrics_handler(State(metrics): State<Metrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health_check() -> &'static str {
    "ok"
}

/// Routes: `GET /metrics` and `GET /healthz`.
pub fn router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_check))
        .with_state(metrics)
}

/// Serve [`router`] on `address` until `shutdown` flips to `true`.
pub async fn serve_metrics(
    address: SocketAddr,
    metrics: Metrics,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), TelemetryError> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(addr = %address, "Starting metrics server");

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Service;

    #[tokio::test]
    async fn test_metrics_endpoint_serves_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_tick(Service::Validator);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve_metrics(address, metrics, shutdown_rx));

        let url = format!("http://{address}/metrics");
        let mut body = None;
        for _ in 0..50 {
            if let Ok(response) = reqwest::get(&url).await {
                body = Some(response.text().await.unwrap());
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let body = body.expect("metrics server never came up");
        assert!(body.contains("rollups_tick_total{service=\"validator\"} 1"));

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}
