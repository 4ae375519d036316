//! HTTP surface: one JSON endpoint for executions plus a liveness route.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::sandbox::{ExecutionRequest, ExecutionResult, Executor, SandboxError};

pub(crate) fn router(executor: Arc<Executor>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/execute", post(execute))
        .layer(CorsLayer::permissive())
        .with_state(executor)
}

/// Bind `host:port`. The host may be an IP address or a resolvable name.
pub(crate) async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))
}

/// Serve on `listener` until the process exits.
pub(crate) async fn serve(listener: TcpListener, executor: Arc<Executor>) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listen address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(executor))
        .await
        .context("Server error")
}

async fn index() -> &'static str {
    "Code execution service is running. POST code to /api/execute."
}

async fn execute(
    State(executor): State<Arc<Executor>>,
    Json(request): Json<ExecutionRequest>,
) -> (StatusCode, Json<ExecutionResult>) {
    // A client that disconnects must not cancel a run mid-teardown.
    let task = tokio::spawn(async move { executor.execute(&request).await });

    match task.await {
        Ok(Ok(result)) => (StatusCode::OK, Json(result)),
        Ok(Err(unavailable)) => (StatusCode::SERVICE_UNAVAILABLE, Json(unavailable.response())),
        Err(e) => {
            error!("Execution task failed: {}", e);
            (
                StatusCode::OK,
                Json(SandboxError::internal(e.to_string()).into_result()),
            )
        }
    }
}
