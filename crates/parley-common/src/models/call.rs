//! Call aggregate — the durable record of a call's participants and lifecycle.
//!
//! This is an audit/state record consulted by REST calls, independent of the
//! in-memory signaling fast path. A call outlives any single connection: it
//! ends (terminal `end_time`) only when its last active participant leaves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// What kind of media the call was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Voice,
    Video,
    ScreenShare,
}

/// Per-participant media toggles, mirrored from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaState {
    pub microphone: bool,
    pub camera: bool,
    pub screen_share: bool,
    /// Playback volume, 0.0–1.0
    pub volume: f32,
}

impl MediaState {
    /// Initial media state for a participant joining a call of `call_type`:
    /// mic on, camera only for video calls, no screen share, full volume.
    pub fn default_for(call_type: CallType) -> Self {
        Self {
            microphone: true,
            camera: call_type == CallType::Video,
            screen_share: false,
            volume: 1.0,
        }
    }
}

/// Partial media-state update; only present fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaStatePatch {
    pub microphone: Option<bool>,
    pub camera: Option<bool>,
    pub screen_share: Option<bool>,
    pub volume: Option<f32>,
}

impl MediaStatePatch {
    /// Merge this patch into an existing media state.
    pub fn apply_to(&self, state: &mut MediaState) {
        if let Some(m) = self.microphone {
            state.microphone = m;
        }
        if let Some(c) = self.camera {
            state.camera = c;
        }
        if let Some(s) = self.screen_share {
            state.screen_share = s;
        }
        if let Some(v) = self.volume {
            state.volume = v.clamp(0.0, 1.0);
        }
    }
}

/// One user's membership in a call. A user appears at most once among the
/// entries without `left_at`; rejoining after leaving appends a new entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParticipant {
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub media_state: MediaState,
}

impl CallParticipant {
    pub fn new(user_id: Uuid, call_type: CallType, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            joined_at,
            left_at: None,
            media_state: MediaState::default_for(call_type),
        }
    }

    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// Per-call policy knobs set by the initiator.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CallSettings {
    #[validate(range(min = 1, max = 100))]
    pub max_participants: u32,
    pub require_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub allow_screen_share: bool,
    pub allow_camera: bool,
    pub recording_allowed: bool,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            max_participants: 10,
            require_password: false,
            password: None,
            allow_screen_share: true,
            allow_camera: true,
            recording_allowed: false,
        }
    }
}

/// The durable call record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// UUIDv7 — time-sortable, so call history orders by id
    pub id: Uuid,
    pub call_type: CallType,
    pub participants: Vec<CallParticipant>,
    /// Set when the call is bound to a voice channel
    pub channel_id: Option<Uuid>,
    pub initiator_id: Uuid,
    pub start_time: DateTime<Utc>,
    /// Terminal once set: the aggregate accepts no further participant mutation
    pub end_time: Option<DateTime<Utc>>,
    pub settings: CallSettings,
}

impl Call {
    /// Participants that have not left.
    pub fn active_participants(&self) -> impl Iterator<Item = &CallParticipant> {
        self.participants.iter().filter(|p| p.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active_participants().count()
    }

    /// Whether `user_id` currently has an active entry.
    pub fn has_active(&self, user_id: Uuid) -> bool {
        self.active_participants().any(|p| p.user_id == user_id)
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Request body for starting a call.
#[derive(Debug, Deserialize, Validate)]
pub struct StartCallRequest {
    pub call_type: CallType,

    /// Users invited into the call up front, besides the initiator
    #[serde(default)]
    pub participants: Vec<Uuid>,

    pub channel_id: Option<Uuid>,

    #[validate(nested)]
    pub settings: Option<CallSettings>,
}
