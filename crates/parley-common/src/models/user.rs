//! User summaries and the directory seam.
//!
//! Parley does not own user records — profiles live in an external user
//! collection reached through [`UserDirectory`]. Presence notifications are
//! enriched from it on a best-effort basis.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public profile fields the directory exposes for enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A voice-channel member as carried in presence notifications.
///
/// `username`/`avatar_url` are `None` when the directory lookup failed —
/// the member list itself is always accurate, enrichment is not guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceMember {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl VoiceMember {
    /// A member entry with no enrichment — id only.
    pub fn bare(user_id: Uuid) -> Self {
        Self {
            user_id,
            username: None,
            avatar_url: None,
        }
    }
}

impl From<UserSummary> for VoiceMember {
    fn from(s: UserSummary) -> Self {
        Self {
            user_id: s.id,
            username: Some(s.username),
            avatar_url: s.avatar_url,
        }
    }
}

/// Read-side of the external user collection.
///
/// Implementations may hit a remote store and may fail; callers degrade to
/// [`VoiceMember::bare`] entries rather than blocking a presence update.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch summaries for the given ids. Unknown ids are simply absent from
    /// the result; a transport/store failure is an `Err`.
    async fn summaries(&self, ids: &[Uuid]) -> anyhow::Result<Vec<UserSummary>>;
}
