/*!
 * HTTP Command Server
 * `POST /instance` accepts one JSON command and replies with JSON
 */

use super::command::{execute, parse_command};
use crate::monitoring::span_command;
use crate::supervisor::InstanceRegistry;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Instrument};

/// Body of a request the parser rejected
#[derive(Debug, Serialize)]
struct ParseFailure {
    err: String,
}

pub fn router(registry: Arc<InstanceRegistry>) -> Router {
    Router::new()
        .route("/instance", post(handle_command))
        .with_state(registry)
}

async fn handle_command(
    State(registry): State<Arc<InstanceRegistry>>,
    body: Bytes,
) -> Response {
    let command = match parse_command(&body) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "Rejected command");
            let failure = ParseFailure { err: e.to_string() };
            return (StatusCode::BAD_REQUEST, Json(failure)).into_response();
        }
    };

    let span = span_command(command.name());
    let reply = execute(command, &registry)
        .instrument(span.span().clone())
        .await;

    match reply.error() {
        Some(err) => span.record_error(err),
        None => span.record_result(true),
    }

    (StatusCode::OK, Json(reply)).into_response()
}

/// Serve commands on `listener` until `shutdown` resolves, then drain
/// in-flight requests
pub async fn serve<F>(
    listener: TcpListener,
    registry: Arc<InstanceRegistry>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Command server listening");
    }

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Command server stopped");
    Ok(())
}
