//! Peer mesh orchestration — one transport connection per remote participant.
//!
//! For a party of N the orchestrator maintains the local user's N−1 edges of
//! the full mesh. The join protocol is asymmetric and must stay that way:
//! incumbents initiate to a newcomer when its join notification arrives, and
//! the newcomer only answers inbound connections from the members it saw in
//! the join snapshot. Symmetric "everyone initiates" produces duplicate,
//! racing connections.
//!
//! Setup failure toward one peer degrades that single edge; the rest of the
//! mesh keeps working.

use parley_common::error::ParleyError;
use parley_common::event::ServerEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// What a media track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Camera,
    Screen,
}

/// Handle to one locally-captured media track. The actual frames live in the
/// transport layer; this is the reference used for attach/replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: Uuid,
    pub kind: TrackKind,
}

impl MediaTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }
}

/// Errors from the underlying transport capability.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection setup failed: {0}")]
    Setup(String),
    #[error("track replacement failed: {0}")]
    Replace(String),
}

/// One established transport connection to a remote peer.
pub trait PeerLink: Send + Sync {
    /// Swap the outbound video track on this connection's video sender.
    /// `None` removes video from the connection.
    fn replace_video_track(&self, track: Option<&MediaTrack>) -> Result<(), TransportError>;

    /// Tear the connection down. Idempotent.
    fn close(&self);
}

/// The underlying real-time transport capability. Implementations own the
/// offer/answer dance and connectivity establishment; the orchestrator only
/// asks for a connection and gets back a live link (or a setup error).
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    async fn connect(
        &self,
        remote: Uuid,
        tracks: &[MediaTrack],
    ) -> Result<Box<dyn PeerLink>, TransportError>;
}

/// Ephemeral record for one open connection, keyed by remote user id.
struct PeerRecord {
    link: Box<dyn PeerLink>,
    /// Outbound video track currently on this connection's sender
    video: Option<MediaTrack>,
}

/// Manages the local user's side of the mesh.
pub struct MeshOrchestrator {
    local_user: Uuid,
    transport: Arc<dyn PeerTransport>,
    audio: MediaTrack,
    camera: Option<MediaTrack>,
    peers: RwLock<HashMap<Uuid, PeerRecord>>,
    channel: RwLock<Option<Uuid>>,
    screen: RwLock<Option<MediaTrack>>,
}

impl MeshOrchestrator {
    pub fn new(
        local_user: Uuid,
        transport: Arc<dyn PeerTransport>,
        audio: MediaTrack,
        camera: Option<MediaTrack>,
    ) -> Self {
        Self {
            local_user,
            transport,
            audio,
            camera,
            peers: RwLock::new(HashMap::new()),
            channel: RwLock::new(None),
            screen: RwLock::new(None),
        }
    }

    pub fn local_user(&self) -> Uuid {
        self.local_user
    }

    /// Enter a voice channel. The snapshot is the member list returned at
    /// join time; per the join protocol we do NOT initiate toward them —
    /// each incumbent will call us, and [`accept_from`] answers.
    ///
    /// [`accept_from`]: MeshOrchestrator::accept_from
    pub async fn join_channel(&self, channel: Uuid, snapshot: &[Uuid]) {
        *self.channel.write().await = Some(channel);
        let expected = snapshot.iter().filter(|&&m| m != self.local_user).count();
        tracing::info!(
            user = %self.local_user,
            channel = %channel,
            expected_inbound = expected,
            "Joined voice channel, answering inbound connections"
        );
    }

    /// Leave the current channel and drop every connection.
    pub async fn leave_channel(&self) {
        *self.channel.write().await = None;
        self.shutdown().await;
    }

    /// React to a presence notification: initiate toward a newcomer in our
    /// channel, tear down on a departure.
    pub async fn handle_presence(&self, event: &ServerEvent) {
        match *event {
            ServerEvent::UserConnected {
                channel_id,
                user_id,
            } => {
                let ours = *self.channel.read().await == Some(channel_id);
                if ours && user_id != self.local_user {
                    // Incumbent side of the join protocol: we call, they answer.
                    let _ = self.connect_to(user_id).await;
                }
            }
            ServerEvent::UserDisconnected {
                channel_id,
                user_id,
            } => {
                if *self.channel.read().await == Some(channel_id) {
                    self.close_peer(user_id).await;
                }
            }
            _ => {}
        }
    }

    /// Open an outbound connection to `remote`, offering the local capture
    /// tracks. Failure removes the edge and reports it; the rest of the mesh
    /// is untouched.
    pub async fn connect_to(&self, remote: Uuid) -> Result<(), ParleyError> {
        if self.peers.read().await.contains_key(&remote) {
            return Ok(());
        }

        let tracks = self.outbound_tracks().await;
        let video = tracks.iter().find(|t| t.kind != TrackKind::Audio).cloned();

        match self.transport.connect(remote, &tracks).await {
            Ok(link) => {
                let mut peers = self.peers.write().await;
                if peers.contains_key(&remote) {
                    // Lost a setup race (e.g. the remote connected to us
                    // while we were dialing); keep the existing link.
                    link.close();
                    return Ok(());
                }
                peers.insert(remote, PeerRecord { link, video });
                tracing::info!(user = %self.local_user, peer = %remote, "Peer connection open");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    user = %self.local_user,
                    peer = %remote,
                    error = %e,
                    "Peer connection setup failed, mesh degraded by one edge"
                );
                Err(ParleyError::TransportSetupFailed {
                    remote,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Answer an inbound connection from `remote` (joiner side of the join
    /// protocol, and callee side of a 1:1 call).
    pub async fn accept_from(&self, remote: Uuid, link: Box<dyn PeerLink>) {
        let video = self.current_video().await;
        let mut peers = self.peers.write().await;
        if peers.contains_key(&remote) {
            tracing::warn!(
                user = %self.local_user,
                peer = %remote,
                "Duplicate inbound connection, keeping the existing link"
            );
            link.close();
            return;
        }
        peers.insert(remote, PeerRecord { link, video });
        tracing::info!(user = %self.local_user, peer = %remote, "Answered peer connection");
    }

    /// Close the connection to `remote` and discard its track reference.
    pub async fn close_peer(&self, remote: Uuid) {
        if let Some(record) = self.peers.write().await.remove(&remote) {
            record.link.close();
            tracing::info!(user = %self.local_user, peer = %remote, "Peer connection closed");
        }
    }

    /// Close every connection.
    pub async fn shutdown(&self) {
        let mut peers = self.peers.write().await;
        for (remote, record) in peers.drain() {
            record.link.close();
            tracing::debug!(user = %self.local_user, peer = %remote, "Peer connection closed");
        }
    }

    /// Replace the outbound video track on every open connection with a
    /// fresh screen track. Per-connection failure is logged and skipped.
    /// Returns the number of connections updated.
    pub async fn start_screen_share(&self) -> usize {
        let screen = MediaTrack::new(TrackKind::Screen);
        let replaced = self.replace_video_everywhere(Some(&screen)).await;
        *self.screen.write().await = Some(screen);
        tracing::info!(user = %self.local_user, replaced, "Screen share started");
        replaced
    }

    /// Revert every open connection to the camera track (or no video).
    pub async fn stop_screen_share(&self) -> usize {
        if self.screen.write().await.take().is_none() {
            return 0;
        }
        let camera = self.camera.clone();
        let replaced = self.replace_video_everywhere(camera.as_ref()).await;
        tracing::info!(user = %self.local_user, replaced, "Screen share stopped");
        replaced
    }

    pub async fn is_screen_sharing(&self) -> bool {
        self.screen.read().await.is_some()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn peer_ids(&self) -> Vec<Uuid> {
        self.peers.read().await.keys().copied().collect()
    }

    async fn replace_video_everywhere(&self, track: Option<&MediaTrack>) -> usize {
        let mut peers = self.peers.write().await;
        let mut replaced = 0;
        for (remote, record) in peers.iter_mut() {
            match record.link.replace_video_track(track) {
                Ok(()) => {
                    record.video = track.cloned();
                    replaced += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        user = %self.local_user,
                        peer = %remote,
                        error = %e,
                        "Track replacement failed on one connection, continuing"
                    );
                }
            }
        }
        replaced
    }

    async fn current_video(&self) -> Option<MediaTrack> {
        match self.screen.read().await.clone() {
            Some(screen) => Some(screen),
            None => self.camera.clone(),
        }
    }

    async fn outbound_tracks(&self) -> Vec<MediaTrack> {
        let mut tracks = vec![self.audio.clone()];
        if let Some(video) = self.current_video().await {
            tracks.push(video);
        }
        tracks
    }
}
