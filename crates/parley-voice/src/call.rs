//! Call lifecycle state machine.
//!
//! One [`CallSession`] per user, enforced independently on caller and
//! receiver sides; the two sides are only eventually consistent, reconciled
//! through explicit accept/reject signals. The machine itself does no I/O —
//! it consumes [`CallInput`]s and returns the [`CallAction`]s the owning
//! context must perform (send a signal, open a peer connection, release
//! everything).
//!
//! There is no `busy` state: a user who is already connected and receives a
//! new initiate auto-accepts it as an additional mesh peer.

use chrono::{DateTime, Duration, Utc};
use parley_common::models::call::CallType;
use uuid::Uuid;

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    /// Local user initiated, awaiting the receiver's decision
    Outgoing,
    /// Receiver notified, awaiting the local decision
    Incoming,
    Connected,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Outgoing {
        receiver_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    },
    Incoming {
        caller_id: Uuid,
    },
    Connected,
}

/// Everything that can drive the machine: local user actions and signals
/// received from the remote side.
#[derive(Debug, Clone)]
pub enum CallInput {
    /// Local: start ringing `receiver_id`
    Initiate {
        receiver_id: Uuid,
        call_type: CallType,
    },
    /// Local: pick up the pending incoming call
    Accept,
    /// Local: decline the pending incoming call
    Reject,
    /// Local: leave/cancel whatever call we are in
    HangUp,
    /// Remote: someone is ringing us
    RemoteIncoming {
        caller_id: Uuid,
        call_type: CallType,
    },
    /// Remote: the user we rang picked up
    RemoteAccepted { receiver_id: Uuid },
    /// Remote: the user we rang declined
    RemoteRejected,
}

/// What the owning context must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    /// Send an initiate-signal addressed to `receiver_id`
    SignalInitiate {
        receiver_id: Uuid,
        call_type: CallType,
    },
    /// Send an accept-signal back to `caller_id`
    SignalAccept { caller_id: Uuid },
    /// Send a reject-signal back to `caller_id`
    SignalReject { caller_id: Uuid },
    /// Open a transport connection toward `user_id` (caller side)
    OpenPeer { user_id: Uuid },
    /// Expect and answer an inbound connection from `user_id` (callee side)
    AwaitPeer { user_id: Uuid },
    /// Close all owned transport connections and release capture devices
    Release,
}

/// Per-user call state machine.
pub struct CallSession {
    phase: Phase,
    /// How long an outgoing call rings before giving up. `None` keeps the
    /// fire-and-forget contract: an unanswered initiate rings forever.
    initiate_timeout: Option<Duration>,
}

impl CallSession {
    pub fn new(initiate_timeout: Option<Duration>) -> Self {
        Self {
            phase: Phase::Idle,
            initiate_timeout,
        }
    }

    /// Session configured from the signaling policy; a zero timeout keeps
    /// fire-and-forget behavior.
    pub fn with_policy(cfg: &parley_common::config::SignalingConfig) -> Self {
        let timeout = (cfg.initiate_timeout_secs > 0)
            .then(|| Duration::seconds(cfg.initiate_timeout_secs as i64));
        Self::new(timeout)
    }

    pub fn phase(&self) -> CallPhase {
        match self.phase {
            Phase::Idle => CallPhase::Idle,
            Phase::Outgoing { .. } => CallPhase::Outgoing,
            Phase::Incoming { .. } => CallPhase::Incoming,
            Phase::Connected => CallPhase::Connected,
        }
    }

    /// The remote party this session is currently ringing or being rung by.
    pub fn pending_remote(&self) -> Option<Uuid> {
        match self.phase {
            Phase::Outgoing { receiver_id, .. } => Some(receiver_id),
            Phase::Incoming { caller_id } => Some(caller_id),
            _ => None,
        }
    }

    /// Apply one input. Inputs that are not valid in the current phase are
    /// no-ops — an `Accept` with no pending caller does nothing, and an
    /// initiate arriving while we are `Outgoing` is dropped.
    pub fn apply(&mut self, input: CallInput) -> Vec<CallAction> {
        match (self.phase, input) {
            (Phase::Idle, CallInput::Initiate { receiver_id, call_type }) => {
                let deadline = self.initiate_timeout.map(|t| Utc::now() + t);
                self.phase = Phase::Outgoing {
                    receiver_id,
                    deadline,
                };
                vec![CallAction::SignalInitiate {
                    receiver_id,
                    call_type,
                }]
            }

            (Phase::Idle, CallInput::RemoteIncoming { caller_id, .. }) => {
                self.phase = Phase::Incoming { caller_id };
                vec![]
            }

            (Phase::Incoming { caller_id }, CallInput::Accept) => {
                self.phase = Phase::Connected;
                vec![
                    CallAction::SignalAccept { caller_id },
                    CallAction::AwaitPeer { user_id: caller_id },
                ]
            }

            (Phase::Incoming { caller_id }, CallInput::Reject) => {
                self.phase = Phase::Idle;
                vec![CallAction::SignalReject { caller_id }]
            }

            (
                Phase::Outgoing { receiver_id, .. },
                CallInput::RemoteAccepted { receiver_id: accepted_by },
            ) if receiver_id == accepted_by => {
                self.phase = Phase::Connected;
                vec![CallAction::OpenPeer { user_id: accepted_by }]
            }

            // A connected user receiving a fresh initiate merges the caller
            // into the mesh instead of reporting busy.
            (Phase::Connected, CallInput::RemoteIncoming { caller_id, .. }) => {
                vec![
                    CallAction::SignalAccept { caller_id },
                    CallAction::AwaitPeer { user_id: caller_id },
                ]
            }

            (
                Phase::Outgoing { .. } | Phase::Incoming { .. } | Phase::Connected,
                CallInput::RemoteRejected,
            ) => {
                self.phase = Phase::Idle;
                vec![CallAction::Release]
            }

            (Phase::Idle, CallInput::HangUp) => vec![],
            (_, CallInput::HangUp) => {
                self.phase = Phase::Idle;
                vec![CallAction::Release]
            }

            _ => vec![],
        }
    }

    /// Expire a stale outgoing call. Only does anything when an initiate
    /// timeout is configured and has elapsed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<CallAction> {
        if let Phase::Outgoing {
            receiver_id,
            deadline: Some(deadline),
        } = self.phase
        {
            if now >= deadline {
                tracing::debug!(receiver = %receiver_id, "Outgoing call timed out");
                self.phase = Phase::Idle;
                return vec![CallAction::Release];
            }
        }
        vec![]
    }
}
