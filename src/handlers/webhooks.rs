//! Event-driven fulfillment path: the processor's webhook receiver.
//!
//! Delivery is at-least-once and arbitrarily delayed, so every response code
//! matters: business no-ops acknowledge with 200 (anything else would have
//! the processor redeliver an already-handled event forever), while
//! transient internal failures return 5xx precisely so redelivery retries
//! them.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::db::AppState;
use crate::error::AppError;
use crate::fulfillment::{self, ReconcileOutcome};
use crate::payments::WebhookEnvelope;

/// Response type for webhook operations.
pub type WebhookResult = (StatusCode, &'static str);

pub async fn handle_processor_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let signature = match headers.get("stripe-signature").and_then(|v| v.to_str().ok()) {
        Some(s) => s,
        None => return (StatusCode::BAD_REQUEST, "Missing signature header"),
    };

    // Nothing in the payload is trusted before this check passes.
    match state.processor.verify_webhook_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(AppError::BadRequest(_)) => {
            return (StatusCode::BAD_REQUEST, "Invalid signature format")
        }
        Err(e) => {
            tracing::error!("signature verification error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Signature verification failed");
        }
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!("failed to parse webhook payload: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    // Only completed checkouts matter here; everything else is acknowledged
    // and dropped.
    if envelope.event_type != "checkout.session.completed" {
        return (StatusCode::OK, "Event ignored");
    }

    match fulfillment::reconcile(&state, &envelope.data.object.id).await {
        Ok(ReconcileOutcome::Granted { .. }) => (StatusCode::OK, "OK"),
        Ok(ReconcileOutcome::AlreadyFulfilled) => (StatusCode::OK, "Already fulfilled"),
        Ok(ReconcileOutcome::NotPaid) => (StatusCode::OK, "Session not paid"),
        Ok(ReconcileOutcome::UnknownPayee) => (StatusCode::OK, "No payee on session"),
        // A session this server never issued; acknowledged, not retried.
        Err(AppError::NotFound(_)) => (StatusCode::OK, "Session not found"),
        Err(e) => {
            tracing::error!("webhook reconciliation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Reconciliation failed")
        }
    }
}
