//! Inbound payment webhook handler.
//!
//! Verification happens against the raw body bytes before any parsing, so
//! the signature always covers exactly what the provider sent. The response
//! acknowledges the *event*, not the fulfillment: once a request is
//! authenticated, anything short of an internal fault answers 200, otherwise
//! the provider would redeliver an already-paid event indefinitely.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde_json::{json, Value};
use tracing::instrument;

use crate::errors::{Error, Result};
use crate::webhooks::classify;
use crate::AppState;

/// `POST /api/webhooks/payments`
#[instrument(skip_all)]
pub async fn receive_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(&state.config.provider.signature_header)
        .and_then(|value| value.to_str().ok());

    match signature {
        Some(signature) => {
            if !state.verifier.verify(&body, signature) {
                return Err(Error::InvalidSignature);
            }
        }
        None => {
            if state.verifier.requires_signature() {
                return Err(Error::MissingSignature);
            }
            // No secret configured: the verifier applies the fail-closed /
            // fail-open policy chosen at startup.
            if !state.verifier.verify(&body, "") {
                return Err(Error::InvalidSignature);
            }
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "webhook body is not valid JSON, acknowledging without processing");
            return Ok(Json(json!({
                "success": false,
                "message": "Malformed webhook payload",
            })));
        }
    };

    let event_name = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    tracing::info!(event = %event_name, "received webhook event");

    match classify(&payload) {
        Ok(event) => {
            // A join error means the fulfillment task panicked; answer 500 so
            // the provider redelivers instead of treating the event as done.
            let outcome = state
                .orchestrator
                .clone()
                .dispatch(event)
                .await
                .map_err(|_| Error::Internal {
                    operation: "process payment event".to_string(),
                })?;
            tracing::debug!(event = %event_name, ?outcome, "webhook processed");
            Ok(Json(json!({
                "success": true,
                "message": "Webhook processed successfully",
                "event": event_name,
            })))
        }
        Err(e) => {
            // Acknowledged anyway: redelivery will not fix a payload-shape bug
            tracing::warn!(event = %event_name, error = %e, "malformed webhook payload acknowledged");
            Ok(Json(json!({
                "success": false,
                "message": e.to_string(),
                "event": event_name,
            })))
        }
    }
}

/// JSON 405 for anything that is not a POST.
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": "Method not allowed",
            "message": "This endpoint only accepts POST requests",
        })),
    )
}
