//! In-memory transport fabric for tests.
//!
//! Wires [`MeshOrchestrator`]s together: `connect` from one side creates a
//! shared link state and hands the opposite endpoint to the remote
//! orchestrator's `accept_from`, so the asymmetric join protocol runs for
//! real. Link state records closes and track replacements per endpoint for
//! assertions.

use crate::mesh::{MediaTrack, MeshOrchestrator, PeerLink, PeerTransport, TransportError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Shared state of one simulated connection.
pub struct LinkState {
    a: Uuid,
    b: Uuid,
    closed: AtomicBool,
    fail_replace: AtomicBool,
    video: std::sync::Mutex<HashMap<Uuid, Option<MediaTrack>>>,
}

impl LinkState {
    fn new(a: Uuid, b: Uuid) -> Self {
        Self {
            a,
            b,
            closed: AtomicBool::new(false),
            fail_replace: AtomicBool::new(false),
            video: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn connects(&self, x: Uuid, y: Uuid) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every subsequent `replace_video_track` on this link fail.
    pub fn fail_replacements(&self) {
        self.fail_replace.store(true, Ordering::SeqCst);
    }

    /// The video track `user` last put on this link, if any replacement
    /// happened (the initial offer is not recorded).
    pub fn video_from(&self, user: Uuid) -> Option<MediaTrack> {
        self.video.lock().unwrap().get(&user).cloned().flatten()
    }
}

struct FabricLink {
    owner: Uuid,
    state: Arc<LinkState>,
}

impl PeerLink for FabricLink {
    fn replace_video_track(&self, track: Option<&MediaTrack>) -> Result<(), TransportError> {
        if self.state.fail_replace.load(Ordering::SeqCst) {
            return Err(TransportError::Replace("simulated sender failure".into()));
        }
        self.state
            .video
            .lock()
            .unwrap()
            .insert(self.owner, track.cloned());
        Ok(())
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// The set of reachable orchestrators plus every link ever created.
#[derive(Default)]
pub struct Fabric {
    orchestrators: RwLock<HashMap<Uuid, Arc<MeshOrchestrator>>>,
    links: RwLock<Vec<Arc<LinkState>>>,
    refused: RwLock<HashSet<Uuid>>,
}

impl Fabric {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn attach(&self, orch: Arc<MeshOrchestrator>) {
        self.orchestrators
            .write()
            .await
            .insert(orch.local_user(), orch);
    }

    /// Make connection attempts toward `user` fail (no route).
    pub async fn refuse(&self, user: Uuid) {
        self.refused.write().await.insert(user);
    }

    /// Number of currently-open links.
    pub async fn link_count(&self) -> usize {
        self.links
            .read()
            .await
            .iter()
            .filter(|l| !l.is_closed())
            .count()
    }

    pub async fn link_between(&self, x: Uuid, y: Uuid) -> Option<Arc<LinkState>> {
        self.links
            .read()
            .await
            .iter()
            .rev()
            .find(|l| l.connects(x, y))
            .cloned()
    }
}

/// Per-user handle into the fabric.
pub struct FabricTransport {
    me: Uuid,
    fabric: Arc<Fabric>,
}

impl FabricTransport {
    pub fn new(me: Uuid, fabric: Arc<Fabric>) -> Self {
        Self { me, fabric }
    }
}

#[async_trait::async_trait]
impl PeerTransport for FabricTransport {
    async fn connect(
        &self,
        remote: Uuid,
        _tracks: &[MediaTrack],
    ) -> Result<Box<dyn PeerLink>, TransportError> {
        if self.fabric.refused.read().await.contains(&remote) {
            return Err(TransportError::Setup("no route to peer".into()));
        }
        let Some(remote_orch) = self.fabric.orchestrators.read().await.get(&remote).cloned()
        else {
            return Err(TransportError::Setup("unknown peer".into()));
        };

        let state = Arc::new(LinkState::new(self.me, remote));
        self.fabric.links.write().await.push(state.clone());

        remote_orch
            .accept_from(
                self.me,
                Box::new(FabricLink {
                    owner: remote,
                    state: state.clone(),
                }),
            )
            .await;

        Ok(Box::new(FabricLink {
            owner: self.me,
            state,
        }))
    }
}
