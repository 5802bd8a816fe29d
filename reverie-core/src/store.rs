//! Storage and session ports, plus in-process implementations.
//!
//! The progression service never touches a database directly; it talks to a
//! [`ProgressStore`] and a [`SessionStatsProvider`]. Both ports are async so
//! that network-backed adapters fit without blocking the runtime.
//!
//! [`MemoryStore`] and [`MemorySessions`] keep everything in `parking_lot`
//! guarded maps and are used by tests, benchmarks and embedded setups. The
//! SQLite adapter lives in [`crate::persistence`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::affinity::AffinityState;
use crate::choice::ChoiceEvent;
use crate::error::Result;
use crate::types::{FragmentId, SessionId, SessionStats, UserId};
use crate::unlock::UnlockRecord;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Durable home of affinity state, unlock records and the choice log.
///
/// Implementations must be safe to share across tasks. Writes are upserts
/// keyed by user (and fragment, for unlock records) so re-sending the same
/// record is harmless.
pub trait ProgressStore: Send + Sync {
    /// Load a user's affinity state, `None` if never saved.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` if the store is unavailable.
    fn load_affinity(&self, user: UserId) -> impl Future<Output = Result<Option<AffinityState>>> + Send;

    /// Upsert a user's affinity state.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` if the write fails.
    fn save_affinity(&self, user: UserId, state: &AffinityState) -> impl Future<Output = Result<()>> + Send;

    /// Every unlock record the user has. Missing fragments are locked.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` if the store is unavailable.
    fn load_unlock_records(&self, user: UserId) -> impl Future<Output = Result<Vec<UnlockRecord>>> + Send;

    /// Upsert one unlock record.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` if the write fails.
    fn save_unlock_record(&self, user: UserId, record: &UnlockRecord) -> impl Future<Output = Result<()>> + Send;

    /// Append one choice event to the user's log. An `event_id` already in
    /// the log is ignored.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` if the write fails.
    fn append_choice_event(&self, event: &ChoiceEvent) -> impl Future<Output = Result<()>> + Send;

    /// The user's choice log in append order.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` if the store is unavailable.
    fn load_choice_events(&self, user: UserId) -> impl Future<Output = Result<Vec<ChoiceEvent>>> + Send;
}

/// Source of conversation-derived counters for a session.
pub trait SessionStatsProvider: Send + Sync {
    /// Counters for `session`, `None` if the session is unknown.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` if the provider is unavailable.
    fn session_stats(&self, session: SessionId) -> impl Future<Output = Result<Option<SessionStats>>> + Send;
}

impl<T: ProgressStore> ProgressStore for Arc<T> {
    fn load_affinity(&self, user: UserId) -> impl Future<Output = Result<Option<AffinityState>>> + Send {
        (**self).load_affinity(user)
    }

    fn save_affinity(&self, user: UserId, state: &AffinityState) -> impl Future<Output = Result<()>> + Send {
        (**self).save_affinity(user, state)
    }

    fn load_unlock_records(&self, user: UserId) -> impl Future<Output = Result<Vec<UnlockRecord>>> + Send {
        (**self).load_unlock_records(user)
    }

    fn save_unlock_record(&self, user: UserId, record: &UnlockRecord) -> impl Future<Output = Result<()>> + Send {
        (**self).save_unlock_record(user, record)
    }

    fn append_choice_event(&self, event: &ChoiceEvent) -> impl Future<Output = Result<()>> + Send {
        (**self).append_choice_event(event)
    }

    fn load_choice_events(&self, user: UserId) -> impl Future<Output = Result<Vec<ChoiceEvent>>> + Send {
        (**self).load_choice_events(user)
    }
}

impl<T: SessionStatsProvider> SessionStatsProvider for Arc<T> {
    fn session_stats(&self, session: SessionId) -> impl Future<Output = Result<Option<SessionStats>>> + Send {
        (**self).session_stats(session)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// [`ProgressStore`] backed by in-process maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    affinity: RwLock<HashMap<UserId, AffinityState>>,
    unlocks: RwLock<HashMap<UserId, HashMap<FragmentId, UnlockRecord>>>,
    events: RwLock<HashMap<UserId, Vec<ChoiceEvent>>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a saved affinity state.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.affinity.read().len()
    }
}

impl ProgressStore for MemoryStore {
    async fn load_affinity(&self, user: UserId) -> Result<Option<AffinityState>> {
        Ok(self.affinity.read().get(&user).cloned())
    }

    async fn save_affinity(&self, user: UserId, state: &AffinityState) -> Result<()> {
        self.affinity.write().insert(user, state.clone());
        Ok(())
    }

    async fn load_unlock_records(&self, user: UserId) -> Result<Vec<UnlockRecord>> {
        Ok(self
            .unlocks
            .read()
            .get(&user)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_unlock_record(&self, user: UserId, record: &UnlockRecord) -> Result<()> {
        self.unlocks
            .write()
            .entry(user)
            .or_default()
            .insert(record.fragment_id.clone(), record.clone());
        Ok(())
    }

    async fn append_choice_event(&self, event: &ChoiceEvent) -> Result<()> {
        let mut events = self.events.write();
        let log = events.entry(event.user_id).or_default();
        if !log.iter().any(|e| e.event_id == event.event_id) {
            log.push(event.clone());
        }
        Ok(())
    }

    async fn load_choice_events(&self, user: UserId) -> Result<Vec<ChoiceEvent>> {
        Ok(self.events.read().get(&user).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// In-memory session provider
// ---------------------------------------------------------------------------

/// [`SessionStatsProvider`] over a map the caller fills in.
#[derive(Debug, Default)]
pub struct MemorySessions {
    sessions: RwLock<HashMap<SessionId, SessionStats>>,
}

impl MemorySessions {
    /// Empty provider: every session is unknown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the counters for a session.
    pub fn set(&self, session: SessionId, stats: SessionStats) {
        self.sessions.write().insert(session, stats);
    }
}

impl SessionStatsProvider for MemorySessions {
    async fn session_stats(&self, session: SessionId) -> Result<Option<SessionStats>> {
        Ok(self.sessions.read().get(&session).cloned())
    }
}
