use axum::{
    extract::State,
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use saferide_core::identity::Actor;
use saferide_core::payment::CheckoutSession;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequestBody {
    pub booking_id: Uuid,
    pub currency: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/checkout", post(start_checkout))
        .route("/v1/payments/renewal", post(start_renewal))
}

/// Create a hosted checkout session for a new (or retried) payment. The
/// response is a redirect handle; the booking only advances when the
/// gateway's webhook confirms.
async fn start_checkout(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CheckoutRequestBody>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let session = state
        .booking_service
        .start_checkout(&actor, body.booking_id, &body.currency)
        .await?;
    Ok(Json(session))
}

async fn start_renewal(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CheckoutRequestBody>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let session = state
        .booking_service
        .start_renewal(&actor, body.booking_id, &body.currency, Utc::now())
        .await?;
    Ok(Json(session))
}
