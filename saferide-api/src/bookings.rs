use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use saferide_assign::Assignment;
use saferide_booking::model::{Booking, BookingRequest, BookingStatus};
use saferide_core::identity::{require_role, Actor, Role};
use saferide_core::EngineError;

use crate::error::ApiError;
use crate::state::AppState;

/// Booking plus its assignment records, the shape admins and guardians see
/// in listings.
#[derive(Debug, Serialize)]
pub struct RideView {
    #[serde(flatten)]
    pub booking: Booking,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Deserialize)]
pub struct StatusFilter {
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideStatusRequest {
    pub status: BookingStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/{child_id}", post(create_booking))
        .route("/v1/bookings", get(my_rides))
        .route("/v1/bookings/child/{child_id}", get(rides_by_child))
        .route("/v1/bookings/all", get(all_rides))
        .route("/v1/bookings/paid", get(paid_rides))
        .route("/v1/bookings/{id}/status", patch(override_status))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(child_id): Path<Uuid>,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = state
        .booking_service
        .create_booking(&actor, child_id, request, Utc::now())
        .await?;
    state.metrics.bookings_created_total.inc();
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn my_rides(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<RideView>>, ApiError> {
    require_role(&actor, Role::Guardian)?;
    let rides = state
        .bookings
        .list_by_guardian(actor.id)
        .into_iter()
        .map(|booking| with_assignments(&state, booking))
        .collect();
    Ok(Json(rides))
}

async fn rides_by_child(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(child_id): Path<Uuid>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<RideView>>, ApiError> {
    require_role(&actor, Role::Guardian)?;
    match state.directory.child_guardian(child_id).await? {
        Some(owner) if owner == actor.id => {}
        _ => {
            return Err(EngineError::Authorization(
                "child does not belong to the calling guardian".to_string(),
            )
            .into())
        }
    }

    let rides = state
        .bookings
        .list_by_child(child_id)
        .into_iter()
        .filter(|b| filter.status.map(|s| b.status == s).unwrap_or(true))
        .map(|booking| with_assignments(&state, booking))
        .collect();
    Ok(Json(rides))
}

async fn all_rides(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<RideView>>, ApiError> {
    require_role(&actor, Role::Admin)?;
    let rides = state
        .bookings
        .list_all()
        .into_iter()
        .map(|booking| with_assignments(&state, booking))
        .collect();
    Ok(Json(rides))
}

async fn paid_rides(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<RideView>>, ApiError> {
    require_role(&actor, Role::Admin)?;
    let rides = state
        .bookings
        .list_by_status(BookingStatus::Paid)
        .into_iter()
        .map(|booking| with_assignments(&state, booking))
        .collect();
    Ok(Json(rides))
}

async fn override_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<OverrideStatusRequest>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .booking_service
        .override_status(&actor, id, request.status, request.reason, Utc::now())
        .await?;
    Ok(Json(booking))
}

fn with_assignments(state: &AppState, booking: Booking) -> RideView {
    let assignments = state.assignments.for_booking(booking.id);
    RideView {
        booking,
        assignments,
    }
}
