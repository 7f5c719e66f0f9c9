//! Gateway session storage.
//!
//! [`GatewayStore`] is the seam between the gateway session layer and
//! wherever its records live. [`MemoryGatewayStore`] keeps them in a
//! sharded in-process map, which is enough for a single gateway instance.
//! Running several gateways behind a balancer needs an implementation
//! backed by a shared transactional store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::GatewaySession;
use crate::auth::AuthError;

/// What to do with a record after [`GatewayStore::modify`] has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retain {
    Keep,
    Remove,
}

/// Read-modify-write callback run under the store's lock for one key.
pub type Mutation = Box<dyn FnOnce(&mut GatewaySession) -> Retain + Send>;

/// Keyed storage for gateway sessions.
///
/// Every method is atomic with respect to the others for the same key.
#[async_trait]
pub trait GatewayStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<GatewaySession>, AuthError>;

    async fn put(&self, key: String, session: GatewaySession) -> Result<(), AuthError>;

    /// Remove a record, returning it if it existed.
    async fn delete(&self, key: &str) -> Result<Option<GatewaySession>, AuthError>;

    /// Drop every record that expired at or before `now`. Returns the count.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, AuthError>;

    /// Apply `mutation` to the record under `key` in one critical section.
    /// Returns the record as it was before the mutation ran, or `None` when
    /// the key is absent (the mutation is then not called).
    async fn modify(
        &self,
        key: &str,
        mutation: Mutation,
    ) -> Result<Option<GatewaySession>, AuthError>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize, AuthError>;
}

/// In-process store on a [`DashMap`].
#[derive(Default)]
pub struct MemoryGatewayStore {
    sessions: DashMap<String, GatewaySession>,
}

impl MemoryGatewayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GatewayStore for MemoryGatewayStore {
    async fn get(&self, key: &str) -> Result<Option<GatewaySession>, AuthError> {
        Ok(self.sessions.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: String, session: GatewaySession) -> Result<(), AuthError> {
        self.sessions.insert(key, session);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<Option<GatewaySession>, AuthError> {
        Ok(self.sessions.remove(key).map(|(_, session)| session))
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, AuthError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        Ok(before.saturating_sub(self.sessions.len()))
    }

    async fn modify(
        &self,
        key: &str,
        mutation: Mutation,
    ) -> Result<Option<GatewaySession>, AuthError> {
        let mut before = None;
        // The shard write lock is held for the whole callback.
        self.sessions.remove_if_mut(key, |_, session| {
            before = Some(session.clone());
            mutation(session) == Retain::Remove
        });
        Ok(before)
    }

    async fn len(&self) -> Result<usize, AuthError> {
        Ok(self.sessions.len())
    }
}
