use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use saferide_assign::Assignment;
use saferide_core::identity::{require_role, Actor, Role};
use saferide_shared::ShiftSlot;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub booking_id: Uuid,
    pub driver_id: Uuid,
    pub shift: ShiftSlot,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/assignments", post(assign_driver))
        .route("/v1/assignments/mine", get(my_assignments))
        .route("/v1/assignments/{id}/accept", patch(accept_assignment))
        .route("/v1/assignments/{id}/reject", patch(reject_assignment))
        .route(
            "/v1/assignments/{booking_id}/{driver_id}",
            delete(unassign_driver),
        )
}

async fn assign_driver(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<AssignRequest>,
) -> Result<(StatusCode, Json<Assignment>), ApiError> {
    let assignment = state
        .coordinator
        .assign_driver(
            &actor,
            request.booking_id,
            request.driver_id,
            request.shift,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn my_assignments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    require_role(&actor, Role::Driver)?;
    Ok(Json(state.assignments.for_driver(actor.id)))
}

async fn accept_assignment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Assignment>, ApiError> {
    let assignment = state.coordinator.driver_accept(&actor, id, Utc::now()).await?;
    Ok(Json(assignment))
}

async fn reject_assignment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Assignment>, ApiError> {
    let assignment = state.coordinator.driver_reject(&actor, id, Utc::now()).await?;
    Ok(Json(assignment))
}

async fn unassign_driver(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((booking_id, driver_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .coordinator
        .admin_unassign(&actor, booking_id, driver_id, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
