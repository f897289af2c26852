//! Call routes — the REST surface over the Call aggregate.
//!
//! Routes:
//! - POST  /calls                       — start a call
//! - GET   /calls/active                — the caller's ongoing calls
//! - GET   /calls/{call_id}             — fetch one call record
//! - POST  /calls/{call_id}/join        — join an ongoing call
//! - POST  /calls/{call_id}/leave       — leave a call
//! - PATCH /calls/{call_id}/participant — update own media state

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
};
use parley_common::error::{ParleyError, ParleyResult};
use parley_common::models::call::{Call, MediaStatePatch, StartCallRequest};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, middleware::AuthContext};

/// Call routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calls", post(start_call))
        .route("/calls/active", get(active_calls))
        .route("/calls/{call_id}", get(get_call))
        .route("/calls/{call_id}/join", post(join_call))
        .route("/calls/{call_id}/leave", post(leave_call))
        .route("/calls/{call_id}/participant", patch(update_participant))
        // All call routes require authentication
        .layer(middleware::from_fn(crate::middleware::auth_middleware))
}

/// POST /calls — start a call with the caller as initiator.
async fn start_call(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<StartCallRequest>,
) -> ParleyResult<(StatusCode, Json<Call>)> {
    req.validate().map_err(|e| ParleyError::Validation {
        message: e.to_string(),
    })?;

    let limits = &parley_common::config::get().limits;
    if let Some(settings) = &req.settings {
        if settings.max_participants > limits.max_call_participants {
            return Err(ParleyError::Validation {
                message: format!(
                    "max_participants exceeds server limit of {}",
                    limits.max_call_participants
                ),
            });
        }
    }

    let call = state.calls.start_call(auth.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(call)))
}

/// GET /calls/active — calls where the caller is still an active participant.
async fn active_calls(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ParleyResult<Json<Vec<Call>>> {
    let calls = state.calls.active_calls(auth.user_id).await?;
    Ok(Json(calls))
}

/// GET /calls/{call_id} — one call record, ended or not.
async fn get_call(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthContext>,
    Path(call_id): Path<Uuid>,
) -> ParleyResult<Json<Call>> {
    let call = state.calls.get_call(call_id).await?;
    Ok(Json(call))
}

/// POST /calls/{call_id}/join — join an ongoing call.
async fn join_call(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(call_id): Path<Uuid>,
) -> ParleyResult<Json<Call>> {
    let call = state.calls.join_call(call_id, auth.user_id).await?;
    Ok(Json(call))
}

/// POST /calls/{call_id}/leave — leave a call.
async fn leave_call(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(call_id): Path<Uuid>,
) -> ParleyResult<Json<Call>> {
    let call = state.calls.leave_call(call_id, auth.user_id).await?;
    Ok(Json(call))
}

/// PATCH /calls/{call_id}/participant — merge a media-state patch into the
/// caller's own participant entry.
async fn update_participant(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(call_id): Path<Uuid>,
    Json(patch): Json<MediaStatePatch>,
) -> ParleyResult<Json<Call>> {
    let call = state
        .calls
        .update_media(call_id, auth.user_id, patch)
        .await?;
    Ok(Json(call))
}
