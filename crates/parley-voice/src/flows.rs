//! End-to-end signaling flows: real registry, router, call state machines
//! and mesh orchestrators, talking over the in-memory transport fabric.
//! Each "client" here plays the part the browser client plays in
//! production: it drains its delivery queue, feeds the events into its call
//! session / orchestrator, and performs the resulting actions.

use crate::call::{CallAction, CallInput, CallPhase, CallSession};
use crate::mesh::{MediaTrack, MeshOrchestrator, TrackKind};
use crate::test_support::{Fabric, FabricTransport};
use parley_common::event::ServerEvent;
use parley_common::models::call::CallType;
use parley_common::models::user::{UserDirectory, UserSummary};
use parley_gateway::router::SignalingRouter;
use parley_presence::{ConnectionHandle, PresenceRegistry, VoiceChannelTracker};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

struct NullDirectory;

#[async_trait::async_trait]
impl UserDirectory for NullDirectory {
    async fn summaries(&self, _ids: &[Uuid]) -> anyhow::Result<Vec<UserSummary>> {
        Ok(Vec::new())
    }
}

struct Client {
    user: Uuid,
    session: CallSession,
    orch: Arc<MeshOrchestrator>,
    rx: mpsc::Receiver<ServerEvent>,
    seen: Vec<ServerEvent>,
}

impl Client {
    async fn connect(registry: &PresenceRegistry, fabric: &Arc<Fabric>) -> Self {
        let user = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(64);
        registry.register(user, ConnectionHandle::new(tx)).await;

        let orch = Arc::new(MeshOrchestrator::new(
            user,
            Arc::new(FabricTransport::new(user, fabric.clone())),
            MediaTrack::new(TrackKind::Audio),
            None,
        ));
        fabric.attach(orch.clone()).await;

        Self {
            user,
            session: CallSession::new(None),
            orch,
            rx,
            seen: Vec::new(),
        }
    }

    /// Drain delivered events, feeding each into the call session and the
    /// mesh orchestrator, then perform the resulting actions.
    async fn pump(&mut self, router: &SignalingRouter) {
        while let Ok(event) = self.rx.try_recv() {
            self.orch.handle_presence(&event).await;

            let input = match &event {
                ServerEvent::CallIncoming {
                    caller_id,
                    call_type,
                } => Some(CallInput::RemoteIncoming {
                    caller_id: *caller_id,
                    call_type: *call_type,
                }),
                ServerEvent::CallAccepted { receiver_id } => Some(CallInput::RemoteAccepted {
                    receiver_id: *receiver_id,
                }),
                ServerEvent::CallRejected => Some(CallInput::RemoteRejected),
                _ => None,
            };
            self.seen.push(event);

            if let Some(input) = input {
                let actions = self.session.apply(input);
                self.perform(actions, router).await;
            }
        }
    }

    async fn act(&mut self, input: CallInput, router: &SignalingRouter) {
        let actions = self.session.apply(input);
        self.perform(actions, router).await;
    }

    /// What the gateway does with the client's outbound messages.
    async fn perform(&mut self, actions: Vec<CallAction>, router: &SignalingRouter) {
        for action in actions {
            match action {
                CallAction::SignalInitiate {
                    receiver_id,
                    call_type,
                } => {
                    let _ = router
                        .route(
                            receiver_id,
                            ServerEvent::CallIncoming {
                                caller_id: self.user,
                                call_type,
                            },
                        )
                        .await;
                }
                CallAction::SignalAccept { caller_id } => {
                    let _ = router
                        .route(
                            caller_id,
                            ServerEvent::CallAccepted {
                                receiver_id: self.user,
                            },
                        )
                        .await;
                }
                CallAction::SignalReject { caller_id } => {
                    let _ = router.route(caller_id, ServerEvent::CallRejected).await;
                }
                CallAction::OpenPeer { user_id } => {
                    let _ = self.orch.connect_to(user_id).await;
                }
                // The transport hands the inbound link to accept_from
                CallAction::AwaitPeer { .. } => {}
                CallAction::Release => self.orch.shutdown().await,
            }
        }
    }

    fn user_connected_count(&self, who: Uuid) -> usize {
        self.seen
            .iter()
            .filter(|ev| {
                matches!(ev, ServerEvent::UserConnected { user_id, .. } if *user_id == who)
            })
            .count()
    }
}

#[tokio::test]
async fn one_to_one_voice_call_connects_both_sides() {
    let registry = PresenceRegistry::new();
    let router = SignalingRouter::new(registry.clone());
    let fabric = Fabric::new();

    let mut a = Client::connect(&registry, &fabric).await;
    let mut b = Client::connect(&registry, &fabric).await;

    // A rings B
    a.act(
        CallInput::Initiate {
            receiver_id: b.user,
            call_type: CallType::Voice,
        },
        &router,
    )
    .await;
    assert_eq!(a.session.phase(), CallPhase::Outgoing);

    b.pump(&router).await;
    assert_eq!(b.session.phase(), CallPhase::Incoming);
    assert!(b.seen.iter().any(|ev| matches!(
        ev,
        ServerEvent::CallIncoming { caller_id, call_type }
            if *caller_id == a.user && *call_type == CallType::Voice
    )));

    // B picks up
    b.act(CallInput::Accept, &router).await;
    assert_eq!(b.session.phase(), CallPhase::Connected);

    // A learns of the accept and opens the peer connection
    a.pump(&router).await;
    assert_eq!(a.session.phase(), CallPhase::Connected);
    assert!(a.seen.iter().any(|ev| matches!(
        ev,
        ServerEvent::CallAccepted { receiver_id } if *receiver_id == b.user
    )));

    assert_eq!(a.orch.peer_count().await, 1);
    assert_eq!(b.orch.peer_count().await, 1);
    assert_eq!(fabric.link_count().await, 1);
}

#[tokio::test]
async fn rejected_call_returns_caller_to_idle() {
    let registry = PresenceRegistry::new();
    let router = SignalingRouter::new(registry.clone());
    let fabric = Fabric::new();

    let mut a = Client::connect(&registry, &fabric).await;
    let mut b = Client::connect(&registry, &fabric).await;

    a.act(
        CallInput::Initiate {
            receiver_id: b.user,
            call_type: CallType::Video,
        },
        &router,
    )
    .await;
    b.pump(&router).await;
    b.act(CallInput::Reject, &router).await;
    assert_eq!(b.session.phase(), CallPhase::Idle);

    a.pump(&router).await;
    assert_eq!(a.session.phase(), CallPhase::Idle);
    assert_eq!(fabric.link_count().await, 0);
}

#[tokio::test]
async fn calling_an_offline_user_is_indistinguishable_from_silence() {
    let registry = PresenceRegistry::new();
    let router = SignalingRouter::new(registry.clone());
    let fabric = Fabric::new();

    let mut a = Client::connect(&registry, &fabric).await;

    a.act(
        CallInput::Initiate {
            receiver_id: Uuid::new_v4(),
            call_type: CallType::Voice,
        },
        &router,
    )
    .await;

    // No error comes back; the caller simply keeps ringing
    a.pump(&router).await;
    assert_eq!(a.session.phase(), CallPhase::Outgoing);
}

#[tokio::test]
async fn three_users_form_a_full_mesh_in_join_order() {
    let registry = PresenceRegistry::new();
    let router = SignalingRouter::new(registry.clone());
    let tracker = VoiceChannelTracker::new(Arc::new(NullDirectory));
    let fabric = Fabric::new();
    let channel = Uuid::new_v4();

    let mut a = Client::connect(&registry, &fabric).await;
    let mut b = Client::connect(&registry, &fabric).await;
    let mut c = Client::connect(&registry, &fabric).await;

    let members = tracker.join(channel, a.user, &registry).await;
    a.orch.join_channel(channel, &members).await;

    let members = tracker.join(channel, b.user, &registry).await;
    b.orch.join_channel(channel, &members).await;
    a.pump(&router).await; // A initiates to newcomer B

    let members = tracker.join(channel, c.user, &registry).await;
    c.orch.join_channel(channel, &members).await;
    a.pump(&router).await; // incumbents A and B each initiate to C
    b.pump(&router).await;
    c.pump(&router).await; // C only answers

    assert_eq!(fabric.link_count().await, 3, "A–B, A–C, B–C");
    assert_eq!(a.orch.peer_count().await, 2);
    assert_eq!(b.orch.peer_count().await, 2);
    assert_eq!(c.orch.peer_count().await, 2);

    assert_eq!(a.user_connected_count(c.user), 1);
    assert_eq!(b.user_connected_count(c.user), 1);
}

#[tokio::test]
async fn disconnect_tears_down_presence_and_mesh_edges() {
    let registry = PresenceRegistry::new();
    let router = SignalingRouter::new(registry.clone());
    let tracker = VoiceChannelTracker::new(Arc::new(NullDirectory));
    let fabric = Fabric::new();
    let channel = Uuid::new_v4();

    let mut a = Client::connect(&registry, &fabric).await;
    let mut b = Client::connect(&registry, &fabric).await;

    let members = tracker.join(channel, a.user, &registry).await;
    a.orch.join_channel(channel, &members).await;
    let members = tracker.join(channel, b.user, &registry).await;
    b.orch.join_channel(channel, &members).await;
    a.pump(&router).await;
    assert_eq!(fabric.link_count().await, 1);

    // B's transport drops: the gateway unregisters and purges
    let b_handle = registry.lookup(b.user).await.unwrap();
    registry.unregister(&b_handle).await;
    tracker.purge_user(b.user, &registry).await;

    assert!(registry.lookup(b.user).await.is_none());
    let all = tracker.get_all().await;
    assert_eq!(all[&channel], vec![a.user], "only A remains in the channel");

    a.pump(&router).await; // A sees the synthetic leave and closes the edge
    assert_eq!(a.orch.peer_count().await, 0);
}
