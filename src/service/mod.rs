//! OTLP/HTTP ingestion endpoint.
//!
//! Only `POST /v1/logs` with a JSON body is served. The response never
//! reflects forwarding outcomes: once the body parses, the exporter gets a
//! `200` and routing problems stay in the relay's log.

use crate::relay::Relay;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::post;
use serde_json::Value;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, warn};

/// Path the log exporter posts to.
pub const LOGS_PATH: &str = "/v1/logs";

/// Largest export request accepted.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Build the ingestion router.
pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route(LOGS_PATH, post(ingest_logs).fallback(not_found))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(relay)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, relay: Arc<Relay>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn ingest_logs(State(relay): State<Arc<Relay>>, body: Bytes) -> StatusCode {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, bytes = body.len(), "rejecting malformed export request");
            return StatusCode::BAD_REQUEST;
        }
    };

    // routing touches the filesystem and editor sockets
    match tokio::task::spawn_blocking(move || relay.ingest(&payload)).await {
        Ok(report) => debug!(
            records = report.records,
            relevant = report.relevant,
            forwarded = report.forwarded,
            unresolved = report.unresolved,
            failed = report.failed,
            "export request routed"
        ),
        Err(err) => error!(error = %err, "routing worker failed"),
    }

    StatusCode::OK
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
