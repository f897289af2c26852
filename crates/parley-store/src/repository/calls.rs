//! Call aggregate operations.
//!
//! These run beside the signaling fast path, not inside it: the aggregate is
//! the durable record consulted over REST, updated as a side effect of call
//! activity. Invariants enforced here:
//! - a user appears at most once among the active participants of a call
//! - the active participant count never exceeds `settings.max_participants`
//! - `end_time` is stamped when the active set empties, and a call with
//!   `end_time` set is terminal — no further participant mutation

use crate::CallStore;
use chrono::Utc;
use parley_common::error::{ParleyError, ParleyResult};
use parley_common::models::call::{
    Call, CallParticipant, MediaStatePatch, StartCallRequest,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct CallRepository {
    store: Arc<dyn CallStore>,
    /// Serializes read-modify-write cycles on call documents. Held across
    /// store awaits, never across any presence lock.
    write_lock: Mutex<()>,
}

impl CallRepository {
    pub fn new(store: Arc<dyn CallStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a call with the initiator as first participant, plus any
    /// invited users. Invitees get a participant entry up front.
    pub async fn start_call(
        &self,
        initiator: Uuid,
        req: StartCallRequest,
    ) -> ParleyResult<Call> {
        let now = Utc::now();
        let mut participants = vec![CallParticipant::new(initiator, req.call_type, now)];
        for invited in req.participants {
            if invited != initiator && !participants.iter().any(|p| p.user_id == invited) {
                participants.push(CallParticipant::new(invited, req.call_type, now));
            }
        }

        let call = Call {
            id: Uuid::now_v7(),
            call_type: req.call_type,
            participants,
            channel_id: req.channel_id,
            initiator_id: initiator,
            start_time: now,
            end_time: None,
            settings: req.settings.unwrap_or_default(),
        };

        self.store.insert(call.clone()).await?;
        tracing::info!(
            call = %call.id,
            initiator = %initiator,
            participants = call.participants.len(),
            "Call started"
        );
        Ok(call)
    }

    /// Add `user` as an active participant.
    pub async fn join_call(&self, call_id: Uuid, user: Uuid) -> ParleyResult<Call> {
        let _guard = self.write_lock.lock().await;
        let mut call = self.fetch(call_id).await?;

        if call.is_ended() {
            return Err(ParleyError::CallEnded);
        }
        if call.has_active(user) {
            return Err(ParleyError::AlreadyInCall);
        }
        if call.active_count() >= call.settings.max_participants as usize {
            return Err(ParleyError::CallFull);
        }

        call.participants
            .push(CallParticipant::new(user, call.call_type, Utc::now()));
        self.store.replace(call.clone()).await?;

        tracing::info!(call = %call_id, user = %user, "User joined call");
        Ok(call)
    }

    /// Stamp `left_at` for `user`; ends the call when the last active
    /// participant leaves.
    pub async fn leave_call(&self, call_id: Uuid, user: Uuid) -> ParleyResult<Call> {
        let _guard = self.write_lock.lock().await;
        let mut call = self.fetch(call_id).await?;

        let now = Utc::now();
        let participant = call
            .participants
            .iter_mut()
            .find(|p| p.is_active() && p.user_id == user)
            .ok_or(ParleyError::NotInCall)?;
        participant.left_at = Some(now);

        if call.active_count() == 0 {
            call.end_time = Some(now);
            tracing::info!(call = %call_id, "Last participant left, call ended");
        }

        self.store.replace(call.clone()).await?;
        tracing::info!(call = %call_id, user = %user, "User left call");
        Ok(call)
    }

    /// Merge a partial media-state patch into `user`'s own active entry.
    pub async fn update_media(
        &self,
        call_id: Uuid,
        user: Uuid,
        patch: MediaStatePatch,
    ) -> ParleyResult<Call> {
        let _guard = self.write_lock.lock().await;
        let mut call = self.fetch(call_id).await?;

        let participant = call
            .participants
            .iter_mut()
            .find(|p| p.is_active() && p.user_id == user)
            .ok_or(ParleyError::NotInCall)?;
        patch.apply_to(&mut participant.media_state);

        self.store.replace(call.clone()).await?;
        Ok(call)
    }

    pub async fn get_call(&self, call_id: Uuid) -> ParleyResult<Call> {
        self.fetch(call_id).await
    }

    /// Calls where `user` is an active participant and no end time is set.
    pub async fn active_calls(&self, user: Uuid) -> ParleyResult<Vec<Call>> {
        self.store.active_for_user(user).await
    }

    async fn fetch(&self, call_id: Uuid) -> ParleyResult<Call> {
        self.store
            .get(call_id)
            .await?
            .ok_or_else(|| ParleyError::NotFound {
                resource: "Call".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCallStore;
    use parley_common::models::call::{CallSettings, CallType};

    struct DownStore;

    #[async_trait::async_trait]
    impl CallStore for DownStore {
        async fn insert(&self, _call: Call) -> ParleyResult<()> {
            Err(unavailable())
        }
        async fn get(&self, _id: Uuid) -> ParleyResult<Option<Call>> {
            Err(unavailable())
        }
        async fn replace(&self, _call: Call) -> ParleyResult<bool> {
            Err(unavailable())
        }
        async fn active_for_user(&self, _user: Uuid) -> ParleyResult<Vec<Call>> {
            Err(unavailable())
        }
    }

    fn unavailable() -> ParleyError {
        ParleyError::PersistenceUnavailable {
            message: "store unreachable".into(),
        }
    }

    fn repo() -> CallRepository {
        CallRepository::new(MemoryCallStore::new())
    }

    fn voice_call(participants: Vec<Uuid>) -> StartCallRequest {
        StartCallRequest {
            call_type: CallType::Voice,
            participants,
            channel_id: None,
            settings: None,
        }
    }

    #[tokio::test]
    async fn start_call_seeds_initiator_and_invitees() {
        let repo = repo();
        let initiator = Uuid::new_v4();
        let invited = Uuid::new_v4();

        let call = repo
            .start_call(
                initiator,
                StartCallRequest {
                    call_type: CallType::Video,
                    participants: vec![invited, initiator, invited],
                    channel_id: None,
                    settings: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(call.participants.len(), 2, "duplicates and self filtered");
        assert_eq!(call.initiator_id, initiator);
        assert!(call.participants[0].media_state.camera, "video call defaults camera on");
        assert_eq!(call.settings.max_participants, 10);
        assert!(call.end_time.is_none());
    }

    #[tokio::test]
    async fn join_rejects_user_already_active() {
        let repo = repo();
        let initiator = Uuid::new_v4();
        let call = repo.start_call(initiator, voice_call(vec![])).await.unwrap();

        let err = repo.join_call(call.id, initiator).await.unwrap_err();
        assert!(matches!(err, ParleyError::AlreadyInCall));
    }

    #[tokio::test]
    async fn join_rejects_when_active_set_is_full() {
        let repo = repo();
        let initiator = Uuid::new_v4();
        let second = Uuid::new_v4();
        let call = repo
            .start_call(
                initiator,
                StartCallRequest {
                    call_type: CallType::Voice,
                    participants: vec![],
                    channel_id: None,
                    settings: Some(CallSettings {
                        max_participants: 2,
                        ..Default::default()
                    }),
                },
            )
            .await
            .unwrap();

        repo.join_call(call.id, second).await.unwrap();

        let err = repo.join_call(call.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ParleyError::CallFull));
        let stored = repo.get_call(call.id).await.unwrap();
        assert_eq!(stored.participants.len(), 2, "rejected join mutated nothing");

        // Capacity counts active participants only: a leave frees a slot
        repo.leave_call(call.id, second).await.unwrap();
        repo.join_call(call.id, Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn last_leave_ends_the_call_and_makes_it_terminal() {
        let repo = repo();
        let initiator = Uuid::new_v4();
        let other = Uuid::new_v4();
        let call = repo.start_call(initiator, voice_call(vec![])).await.unwrap();
        repo.join_call(call.id, other).await.unwrap();

        let call_after = repo.leave_call(call.id, other).await.unwrap();
        assert!(call_after.end_time.is_none(), "someone is still in the call");

        let call_after = repo.leave_call(call.id, initiator).await.unwrap();
        assert!(call_after.end_time.is_some());

        let err = repo.join_call(call.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ParleyError::CallEnded));
    }

    #[tokio::test]
    async fn leave_requires_an_active_entry() {
        let repo = repo();
        let initiator = Uuid::new_v4();
        let call = repo.start_call(initiator, voice_call(vec![])).await.unwrap();

        let err = repo.leave_call(call.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ParleyError::NotInCall));

        repo.leave_call(call.id, initiator).await.unwrap();
        let err = repo.leave_call(call.id, initiator).await.unwrap_err();
        assert!(matches!(err, ParleyError::NotInCall), "double leave");
    }

    #[tokio::test]
    async fn rejoin_after_leaving_appends_a_fresh_entry() {
        let repo = repo();
        let initiator = Uuid::new_v4();
        let other = Uuid::new_v4();
        let call = repo.start_call(initiator, voice_call(vec![])).await.unwrap();
        repo.join_call(call.id, other).await.unwrap();
        repo.leave_call(call.id, other).await.unwrap();

        let call = repo.join_call(call.id, other).await.unwrap();
        assert_eq!(call.participants.len(), 3);
        assert_eq!(
            call.active_participants()
                .filter(|p| p.user_id == other)
                .count(),
            1,
            "at most one active entry per user"
        );
    }

    #[tokio::test]
    async fn media_patch_touches_only_the_callers_entry() {
        let repo = repo();
        let initiator = Uuid::new_v4();
        let other = Uuid::new_v4();
        let call = repo.start_call(initiator, voice_call(vec![])).await.unwrap();
        repo.join_call(call.id, other).await.unwrap();

        let patch = MediaStatePatch {
            microphone: Some(false),
            screen_share: Some(true),
            ..Default::default()
        };
        let call = repo.update_media(call.id, other, patch).await.unwrap();

        let entry = |uid: Uuid| {
            call.participants
                .iter()
                .find(|p| p.user_id == uid)
                .unwrap()
                .media_state
                .clone()
        };
        assert!(!entry(other).microphone);
        assert!(entry(other).screen_share);
        assert!(entry(initiator).microphone, "initiator untouched");

        let err = repo
            .update_media(call.id, Uuid::new_v4(), MediaStatePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::NotInCall));
    }

    #[tokio::test]
    async fn active_calls_lists_only_ongoing_membership() {
        let repo = repo();
        let user = Uuid::new_v4();

        let ongoing = repo.start_call(user, voice_call(vec![])).await.unwrap();
        let left = repo.start_call(user, voice_call(vec![])).await.unwrap();
        repo.leave_call(left.id, user).await.unwrap();
        repo.start_call(Uuid::new_v4(), voice_call(vec![])).await.unwrap();

        let active = repo.active_calls(user).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, ongoing.id);
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_persistence_unavailable() {
        let repo = CallRepository::new(Arc::new(DownStore));
        let err = repo
            .start_call(Uuid::new_v4(), voice_call(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::PersistenceUnavailable { .. }));

        let err = repo.join_call(Uuid::now_v7(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ParleyError::PersistenceUnavailable { .. }));
    }

    #[tokio::test]
    async fn get_call_for_unknown_id_is_not_found() {
        let repo = repo();
        let err = repo.get_call(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, ParleyError::NotFound { .. }));
    }
}
