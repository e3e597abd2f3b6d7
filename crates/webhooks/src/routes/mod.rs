//! HTTP route handlers.
//!
//! # Routes
//!
//! - `POST /webhooks/stripe` - Payment provider webhook
//! - `GET /health` - Liveness
//! - `GET /health/ready` - Readiness (order store reachable)

pub mod webhooks;

use axum::{Router, extract::State, http::StatusCode, routing::get};

use crate::state::AppState;

/// Build all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(webhooks::router())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the order store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.pipeline().orders().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
