use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use saferide_core::EngineError;
use saferide_payments::signature::SIGNATURE_HEADER;
use saferide_payments::WebhookAck;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
///
/// Receives payment events from the gateway. Signature failures and
/// unparseable payloads are rejected so the gateway retries; once the event
/// is admitted to the ledger the response is 200 regardless of the business
/// outcome — this engine never asks for redelivery to fix its own
/// processing.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state
        .reconciler
        .handle_event(&body, signature, Utc::now())
        .await
    {
        Ok(ack) => {
            let outcome = match ack {
                WebhookAck::Processed => "processed",
                WebhookAck::Duplicate => "duplicate",
                WebhookAck::Ignored => "ignored",
            };
            state
                .metrics
                .webhook_events_total
                .with_label_values(&[outcome])
                .inc();
            Ok((
                StatusCode::OK,
                Json(json!({ "received": true, "outcome": outcome })),
            ))
        }
        Err(err) => {
            state
                .metrics
                .webhook_events_total
                .with_label_values(&["rejected"])
                .inc();
            match err {
                EngineError::Validation(_) | EngineError::Authorization(_) => {
                    tracing::warn!(error = %err, "webhook delivery rejected");
                    Err(StatusCode::BAD_REQUEST)
                }
                other => {
                    tracing::error!(error = %other, "webhook handling failed");
                    Err(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }
    }
}
