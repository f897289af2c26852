//! Voice presence routes — REST snapshots of the live voice state.
//!
//! The WebSocket gateway is the mutation path (join/leave); these endpoints
//! only read, for clients that render occupancy without a gateway
//! connection.
//!
//! Routes:
//! - GET /voice/states                 — full channel→members snapshot
//! - GET /voice/channels/{channel_id}  — one channel's members

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    middleware,
    routing::get,
};
use parley_common::error::ParleyResult;
use parley_common::models::user::VoiceMember;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{AppState, middleware::AuthContext};

/// Voice routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voice/states", get(voice_states))
        .route("/voice/channels/{channel_id}", get(voice_channel))
        .layer(middleware::from_fn(crate::middleware::auth_middleware))
}

#[derive(Debug, Serialize)]
pub struct VoiceStatesResponse {
    pub channels: HashMap<Uuid, Vec<VoiceMember>>,
}

#[derive(Debug, Serialize)]
pub struct VoiceChannelResponse {
    pub channel_id: Uuid,
    pub members: Vec<VoiceMember>,
    pub member_count: usize,
}

/// GET /voice/states — enriched snapshot of every occupied voice channel.
async fn voice_states(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthContext>,
) -> ParleyResult<Json<VoiceStatesResponse>> {
    let channels = state.tracker.snapshot().await;
    Ok(Json(VoiceStatesResponse { channels }))
}

/// GET /voice/channels/{channel_id} — who is in one voice channel.
async fn voice_channel(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthContext>,
    Path(channel_id): Path<Uuid>,
) -> ParleyResult<Json<VoiceChannelResponse>> {
    let member_ids = state.tracker.channel_members(channel_id).await;
    let members = state.tracker.enriched_members(&member_ids).await;
    Ok(Json(VoiceChannelResponse {
        channel_id,
        member_count: members.len(),
        members,
    }))
}
