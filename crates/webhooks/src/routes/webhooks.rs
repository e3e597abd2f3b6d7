//! Payment webhook endpoint.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Serialize;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;
use crate::webhook::{SIGNATURE_HEADER, route_event};

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct Received {
    pub received: bool,
}

/// Create webhook routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/stripe", post(handle_webhook))
}

/// Verify, route and acknowledge one delivery.
///
/// Returns 400 only when the delivery is rejected before any processing.
/// Once an event is verified the response is 200 even if downstream steps
/// failed.
#[instrument(skip_all)]
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Received>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = state.verifier().verify(&body, signature)?;
    tracing::info!(event_id = %event.id, kind = event.event.kind(), "Webhook verified");

    route_event(state.pipeline(), event).await;

    Ok(Json(Received { received: true }))
}
