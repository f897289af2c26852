//! Signal event types — the server→client half of the wire protocol.
//!
//! The gateway delivers these to connected clients through their
//! per-connection queues; the presence tracker and signaling router both
//! produce them. This module lives in `parley-common` so gateway, presence,
//! and API crates can all use it without circular deps.
//!
//! One variant per boundary event, each with a typed payload — there is no
//! free-form JSON event envelope on purpose.

use crate::models::call::CallType;
use crate::models::user::VoiceMember;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Events pushed from the server to a single connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum ServerEvent {
    /// Connection bound to a user identity.
    Ready { session_id: String },

    /// Someone is calling you.
    CallIncoming { caller_id: Uuid, call_type: CallType },

    /// The user you called picked up.
    CallAccepted { receiver_id: Uuid },

    /// The user you called declined.
    CallRejected,

    /// You joined a voice channel — here is the current member list.
    VoiceJoined {
        channel_id: Uuid,
        members: Vec<VoiceMember>,
    },

    /// Another user joined a voice channel you are in.
    UserConnected { channel_id: Uuid, user_id: Uuid },

    /// A user left a voice channel you are in (explicit leave or disconnect).
    UserDisconnected { channel_id: Uuid, user_id: Uuid },

    /// A channel's member list changed — enriched broadcast for sidebars.
    VoiceStatusUpdate {
        channel_id: Uuid,
        members: Vec<VoiceMember>,
    },

    /// Full voice presence snapshot, for a fresh subscriber.
    VoiceStates {
        channels: HashMap<Uuid, Vec<VoiceMember>>,
    },

    /// Protocol-level error (bad payload, not identified, ...).
    Error { code: u32, message: String },
}
