//! # parley-store
//!
//! Persistence seam for the Call aggregate. The durable store is an external
//! document collection reached through [`CallStore`]'s simple collection
//! operations; [`memory::MemoryCallStore`] is the in-process implementation
//! used for single-node deployments and tests.
//!
//! [`repository::CallRepository`] sits on top and enforces the aggregate
//! invariants (one active entry per user, capacity, terminal end time).

pub mod memory;
pub mod repository;

use parley_common::error::ParleyResult;
use parley_common::models::call::Call;
use uuid::Uuid;

/// Collection operations over the call document store.
///
/// Implementations may block on an external store and may fail with
/// `PersistenceUnavailable`; callers must not hold any presence lock across
/// these calls.
#[async_trait::async_trait]
pub trait CallStore: Send + Sync {
    async fn insert(&self, call: Call) -> ParleyResult<()>;

    async fn get(&self, id: Uuid) -> ParleyResult<Option<Call>>;

    /// Replace the stored document with `call` (matched by id).
    /// Returns `false` if no such document exists.
    async fn replace(&self, call: Call) -> ParleyResult<bool>;

    /// Calls where `user` has an active participant entry and no end time.
    async fn active_for_user(&self, user: Uuid) -> ParleyResult<Vec<Call>>;
}
