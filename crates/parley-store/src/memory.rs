//! In-memory document stores — the single-node deployment path.

use crate::CallStore;
use parley_common::error::ParleyResult;
use parley_common::models::call::Call;
use parley_common::models::user::{UserDirectory, UserSummary};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Call collection held in process memory.
#[derive(Default)]
pub struct MemoryCallStore {
    calls: RwLock<HashMap<Uuid, Call>>,
}

impl MemoryCallStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl CallStore for MemoryCallStore {
    async fn insert(&self, call: Call) -> ParleyResult<()> {
        self.calls.write().await.insert(call.id, call);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ParleyResult<Option<Call>> {
        Ok(self.calls.read().await.get(&id).cloned())
    }

    async fn replace(&self, call: Call) -> ParleyResult<bool> {
        let mut calls = self.calls.write().await;
        match calls.get_mut(&call.id) {
            Some(slot) => {
                *slot = call;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn active_for_user(&self, user: Uuid) -> ParleyResult<Vec<Call>> {
        Ok(self
            .calls
            .read()
            .await
            .values()
            .filter(|c| !c.is_ended() && c.has_active(user))
            .cloned()
            .collect())
    }
}

/// User collection held in process memory. Stands in for the external user
/// directory the presence tracker enriches notifications from.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, UserSummary>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn upsert(&self, summary: UserSummary) {
        self.users.write().await.insert(summary.id, summary);
    }
}

#[async_trait::async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn summaries(&self, ids: &[Uuid]) -> anyhow::Result<Vec<UserSummary>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_common::models::call::{CallParticipant, CallSettings, CallType};

    fn call(user: Uuid) -> Call {
        Call {
            id: Uuid::now_v7(),
            call_type: CallType::Voice,
            participants: vec![CallParticipant::new(user, CallType::Voice, Utc::now())],
            channel_id: None,
            initiator_id: user,
            start_time: Utc::now(),
            end_time: None,
            settings: CallSettings::default(),
        }
    }

    #[tokio::test]
    async fn replace_of_missing_document_reports_false() {
        let store = MemoryCallStore::new();
        assert!(!store.replace(call(Uuid::new_v4())).await.unwrap());
    }

    #[tokio::test]
    async fn directory_returns_only_known_ids() {
        let directory = MemoryUserDirectory::new();
        let known = Uuid::new_v4();
        directory
            .upsert(UserSummary {
                id: known,
                username: "rosa".into(),
                avatar_url: None,
            })
            .await;

        let found = directory
            .summaries(&[known, Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "rosa");
    }
}
