//! Voice channel presence — tracks who currently sits in which voice channel.
//!
//! Derived entirely from join/leave events (plus synthetic leaves on
//! disconnect); nothing here is durable. Membership changes fan out to the
//! channel's other members in the order they were processed, and an enriched
//! status update is broadcast to every registered connection so idle clients
//! can render channel occupancy.
//!
//! Enrichment (usernames, avatars) comes from the external user directory
//! and is best-effort: when the directory is unavailable the notification
//! degrades to bare user ids instead of blocking the presence update.

use crate::registry::PresenceRegistry;
use parley_common::event::ServerEvent;
use parley_common::models::user::{UserDirectory, VoiceMember};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Member list of one channel, locked independently so one channel's churn
/// never serializes another's.
type Members = Arc<Mutex<Vec<Uuid>>>;

/// Per-channel set of currently-joined users.
pub struct VoiceChannelTracker {
    channels: RwLock<HashMap<Uuid, Members>>,
    directory: Arc<dyn UserDirectory>,
}

impl VoiceChannelTracker {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            directory,
        }
    }

    /// Add `user` to `channel`, notify the channel's other members, and
    /// broadcast the updated occupancy. Returns the updated member list.
    ///
    /// Joining twice is a no-op for membership but still re-triggers the
    /// fan-out; receivers must tolerate duplicate notifications.
    pub async fn join(
        &self,
        channel: Uuid,
        user: Uuid,
        registry: &PresenceRegistry,
    ) -> Vec<Uuid> {
        let entry = {
            self.channels
                .write()
                .await
                .entry(channel)
                .or_default()
                .clone()
        };

        let mut members = entry.lock().await;
        if !members.contains(&user) {
            members.push(user);
        }
        let snapshot = members.clone();

        // Notify incumbents while the channel lock is held: deliveries for
        // this channel go out in the order the tracker processed the joins.
        for &member in snapshot.iter().filter(|&&m| m != user) {
            if let Some(handle) = registry.lookup(member).await {
                handle.deliver(ServerEvent::UserConnected {
                    channel_id: channel,
                    user_id: user,
                });
            }
        }
        drop(members);

        tracing::info!(user = %user, channel = %channel, "User joined voice channel");

        self.broadcast_status(channel, &snapshot, registry).await;
        snapshot
    }

    /// Remove `user` from `channel` and signal the departure to the
    /// remaining members. No-op if the user was not a member.
    pub async fn leave(&self, channel: Uuid, user: Uuid, registry: &PresenceRegistry) {
        let Some(entry) = self.channels.read().await.get(&channel).cloned() else {
            return;
        };

        let mut members = entry.lock().await;
        let Some(pos) = members.iter().position(|&m| m == user) else {
            return;
        };
        members.remove(pos);
        let remaining = members.clone();

        for &member in &remaining {
            if let Some(handle) = registry.lookup(member).await {
                handle.deliver(ServerEvent::UserDisconnected {
                    channel_id: channel,
                    user_id: user,
                });
            }
        }
        drop(members);

        tracing::info!(user = %user, channel = %channel, "User left voice channel");

        if remaining.is_empty() {
            self.drop_if_empty(channel).await;
        }
        self.broadcast_status(channel, &remaining, registry).await;
    }

    /// Synthetic leave for every channel `user` occupied — the disconnect
    /// path. Returns the channels that were left.
    pub async fn purge_user(&self, user: Uuid, registry: &PresenceRegistry) -> Vec<Uuid> {
        let snapshot: Vec<(Uuid, Members)> = self
            .channels
            .read()
            .await
            .iter()
            .map(|(id, members)| (*id, members.clone()))
            .collect();

        let mut left = Vec::new();
        for (channel, entry) in snapshot {
            {
                let members = entry.lock().await;
                if !members.contains(&user) {
                    continue;
                }
            }
            self.leave(channel, user, registry).await;
            left.push(channel);
        }

        if !left.is_empty() {
            tracing::info!(
                user = %user,
                channels = left.len(),
                "Purged disconnected user from voice channels"
            );
        }
        left
    }

    /// Full channel→members snapshot.
    pub async fn get_all(&self) -> HashMap<Uuid, Vec<Uuid>> {
        let channels: Vec<(Uuid, Members)> = self
            .channels
            .read()
            .await
            .iter()
            .map(|(id, members)| (*id, members.clone()))
            .collect();

        let mut out = HashMap::new();
        for (id, entry) in channels {
            let members = entry.lock().await.clone();
            if !members.is_empty() {
                out.insert(id, members);
            }
        }
        out
    }

    /// Members of a single channel.
    pub async fn channel_members(&self, channel: Uuid) -> Vec<Uuid> {
        match self.channels.read().await.get(&channel) {
            Some(entry) => entry.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Full snapshot with directory enrichment, for fresh subscribers.
    pub async fn snapshot(&self) -> HashMap<Uuid, Vec<VoiceMember>> {
        let all = self.get_all().await;
        let mut out = HashMap::with_capacity(all.len());
        for (channel, members) in all {
            out.insert(channel, self.enriched_members(&members).await);
        }
        out
    }

    /// Resolve member ids to enriched entries; degrades to bare ids when the
    /// directory is unavailable.
    pub async fn enriched_members(&self, ids: &[Uuid]) -> Vec<VoiceMember> {
        match self.directory.summaries(ids).await {
            Ok(summaries) => {
                let mut by_id: HashMap<Uuid, _> =
                    summaries.into_iter().map(|s| (s.id, s)).collect();
                ids.iter()
                    .map(|id| {
                        by_id
                            .remove(id)
                            .map(VoiceMember::from)
                            .unwrap_or_else(|| VoiceMember::bare(*id))
                    })
                    .collect()
            }
            Err(e) => {
                tracing::warn!(error = %e, "User directory lookup failed, sending bare member ids");
                ids.iter().map(|id| VoiceMember::bare(*id)).collect()
            }
        }
    }

    async fn broadcast_status(
        &self,
        channel: Uuid,
        members: &[Uuid],
        registry: &PresenceRegistry,
    ) {
        let members = self.enriched_members(members).await;
        for handle in registry.handles().await {
            handle.deliver(ServerEvent::VoiceStatusUpdate {
                channel_id: channel,
                members: members.clone(),
            });
        }
    }

    async fn drop_if_empty(&self, channel: Uuid) {
        let mut channels = self.channels.write().await;
        let empty = match channels.get(&channel) {
            Some(entry) => entry.lock().await.is_empty(),
            None => false,
        };
        if empty {
            channels.remove(&channel);
        }
    }
}
