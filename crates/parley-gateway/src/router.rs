//! Signaling router — forwards call-control events between two endpoints.
//!
//! At-most-once, no acknowledgment: the sender learns nothing about
//! delivery. A dropped initiate never produces an `incoming` transition on
//! the other side, which is observably identical to "receiver offline" —
//! call signaling is idempotent at the state-machine level, so this stays
//! simple and fast.

use parley_common::error::ParleyError;
use parley_common::event::ServerEvent;
use parley_presence::PresenceRegistry;
use uuid::Uuid;

#[derive(Clone)]
pub struct SignalingRouter {
    registry: PresenceRegistry,
}

impl SignalingRouter {
    pub fn new(registry: PresenceRegistry) -> Self {
        Self { registry }
    }

    /// Deliver `event` to `target`'s registered connection.
    ///
    /// `TargetOffline` is returned so the call site can log it, never so it
    /// can be surfaced to a remote party. A full outbound queue also drops
    /// the event, silently.
    pub async fn route(&self, target: Uuid, event: ServerEvent) -> Result<(), ParleyError> {
        match self.registry.lookup(target).await {
            Some(handle) => {
                handle.deliver(event);
                Ok(())
            }
            None => {
                tracing::debug!(target = %target, event = ?event, "Signaling target offline, event dropped");
                Err(ParleyError::TargetOffline { user_id: target })
            }
        }
    }
}
