//! # parley-gateway
//!
//! Real-time WebSocket gateway for Parley. Handles:
//! - Binding connections to user identities (presence registration)
//! - Call-control signaling (initiate/accept/reject) between endpoints
//! - Voice channel join/leave with presence fan-out
//! - Disconnect cleanup: registry removal plus synthetic voice leaves
//!
//! Signaling is fire-and-forget: events to offline or backlogged targets are
//! dropped with no failure notice to the sender.

pub mod router;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use parley_common::event::ServerEvent;
use parley_common::models::call::CallType;
use parley_presence::{ConnectionHandle, PresenceRegistry, VoiceChannelTracker};
use router::SignalingRouter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Gateway state shared by every connection task.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: PresenceRegistry,
    pub tracker: Arc<VoiceChannelTracker>,
    pub router: SignalingRouter,
    /// Per-connection outbound queue depth; events past it are dropped.
    pub queue_depth: usize,
}

impl GatewayState {
    pub fn new(
        registry: PresenceRegistry,
        tracker: Arc<VoiceChannelTracker>,
        queue_depth: usize,
    ) -> Self {
        let router = SignalingRouter::new(registry.clone());
        Self {
            registry,
            tracker,
            router,
            queue_depth,
        }
    }
}

/// Messages a client may send to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum ClientMessage {
    /// Bind this connection to a user identity
    Identify { user_id: Uuid },

    /// Ring a specific user
    CallInitiate {
        receiver_id: Uuid,
        call_type: CallType,
    },

    /// Pick up a pending call from `caller_id`
    CallAccept { caller_id: Uuid },

    /// Decline a pending call from `caller_id`
    CallReject { caller_id: Uuid },

    /// Enter a voice channel
    JoinVoice { channel_id: Uuid },

    /// Leave a voice channel
    LeaveVoice { channel_id: Uuid },

    /// Request the full voice presence snapshot
    GetVoiceStates,
}

/// Build the gateway WebSocket router.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/gateway", get(ws_handler))
        .with_state(Arc::new(state))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Handle a single WebSocket connection — one task per live connection.
async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut sender, mut receiver) = socket.split();

    let session_id = Uuid::new_v4().to_string();

    // Everything addressed to this connection (signals, presence fan-out,
    // direct replies) funnels through one queue onto the socket.
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.queue_depth);
    let handle = ConnectionHandle::new(tx);

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut user_id: Option<Uuid> = None;
    let mut current_voice: Option<Uuid> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) else {
                    handle.deliver(ServerEvent::Error {
                        code: 4000,
                        message: "Invalid message".into(),
                    });
                    continue;
                };

                match client_msg {
                    ClientMessage::Identify { user_id: uid } => {
                        state.registry.register(uid, handle.clone()).await;
                        user_id = Some(uid);
                        handle.deliver(ServerEvent::Ready {
                            session_id: session_id.clone(),
                        });
                        tracing::info!(session = %session_id, user = %uid, "Connection identified");
                    }

                    ClientMessage::CallInitiate {
                        receiver_id,
                        call_type,
                    } => {
                        let Some(uid) = user_id else {
                            not_identified(&handle);
                            continue;
                        };
                        // Fire-and-forget: an offline receiver just never rings
                        if let Err(e) = state
                            .router
                            .route(
                                receiver_id,
                                ServerEvent::CallIncoming {
                                    caller_id: uid,
                                    call_type,
                                },
                            )
                            .await
                        {
                            tracing::debug!(error = %e, "Call initiate dropped");
                        }
                    }

                    ClientMessage::CallAccept { caller_id } => {
                        let Some(uid) = user_id else {
                            not_identified(&handle);
                            continue;
                        };
                        if let Err(e) = state
                            .router
                            .route(caller_id, ServerEvent::CallAccepted { receiver_id: uid })
                            .await
                        {
                            tracing::debug!(error = %e, "Call accept dropped");
                        }
                    }

                    ClientMessage::CallReject { caller_id } => {
                        if user_id.is_none() {
                            not_identified(&handle);
                            continue;
                        }
                        if let Err(e) =
                            state.router.route(caller_id, ServerEvent::CallRejected).await
                        {
                            tracing::debug!(error = %e, "Call reject dropped");
                        }
                    }

                    ClientMessage::JoinVoice { channel_id } => {
                        let Some(uid) = user_id else {
                            not_identified(&handle);
                            continue;
                        };
                        // One voice channel at a time: leave the previous one first
                        if let Some(old) = current_voice.take() {
                            if old != channel_id {
                                state.tracker.leave(old, uid, &state.registry).await;
                            }
                        }
                        let members = state.tracker.join(channel_id, uid, &state.registry).await;
                        current_voice = Some(channel_id);

                        let members = state.tracker.enriched_members(&members).await;
                        handle.deliver(ServerEvent::VoiceJoined {
                            channel_id,
                            members,
                        });
                    }

                    ClientMessage::LeaveVoice { channel_id } => {
                        let Some(uid) = user_id else {
                            not_identified(&handle);
                            continue;
                        };
                        state.tracker.leave(channel_id, uid, &state.registry).await;
                        if current_voice == Some(channel_id) {
                            current_voice = None;
                        }
                    }

                    ClientMessage::GetVoiceStates => {
                        let channels = state.tracker.snapshot().await;
                        handle.deliver(ServerEvent::VoiceStates { channels });
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Cleanup: drop the registry entry first so lookups stop resolving to
    // this connection, then synthesize a leave for every occupied channel.
    // Skipped when a newer connection already replaced this handle.
    if state.registry.unregister(&handle).await.is_some() {
        if let Some(uid) = user_id {
            state.tracker.purge_user(uid, &state.registry).await;
        }
    }

    send_task.abort();
    tracing::info!(session = %session_id, "Client disconnected from gateway");
}

fn not_identified(handle: &ConnectionHandle) {
    handle.deliver(ServerEvent::Error {
        code: 4003,
        message: "Not identified".into(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_op_d_envelope() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"op":"JoinVoice","d":{"channel_id":"00000000-0000-0000-0000-000000000000"}}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::JoinVoice { .. }));

        let msg: ClientMessage = serde_json::from_str(r#"{"op":"GetVoiceStates"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::GetVoiceStates));
    }

    #[test]
    fn call_initiate_parses_call_type() {
        let json = serde_json::json!({
            "op": "CallInitiate",
            "d": {
                "receiver_id": Uuid::new_v4(),
                "call_type": "video",
            }
        });
        let msg: ClientMessage = serde_json::from_value(json).unwrap();
        match msg {
            ClientMessage::CallInitiate { call_type, .. } => {
                assert_eq!(call_type, CallType::Video)
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
