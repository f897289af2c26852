//! # parley-presence
//!
//! Live presence coordination for Parley:
//! - [`registry::PresenceRegistry`] — who is reachable right now, and through
//!   which connection
//! - [`tracker::VoiceChannelTracker`] — who currently sits in which voice
//!   channel
//!
//! Both are in-memory and ephemeral by design; durable membership lives
//! elsewhere. Everything here is safe to call from any connection task.

pub mod registry;
pub mod tracker;

pub use registry::{ConnectionHandle, PresenceRegistry};
pub use tracker::VoiceChannelTracker;
