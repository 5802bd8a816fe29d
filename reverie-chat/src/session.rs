//! Session tracker — the chat side's [`SessionStatsProvider`].
//!
//! Counts messages per session and derives play time as the span between
//! the session's opening and its latest activity, in whole minutes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reverie_core::error::{ReverieError, Result};
use reverie_core::store::SessionStatsProvider;
use reverie_core::types::{SessionId, SessionStats, UserId};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct SessionRecord {
    user_id: UserId,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    messages: u32,
}

impl SessionRecord {
    fn stats(&self) -> SessionStats {
        let minutes = (self.last_activity - self.started_at).num_minutes().max(0);
        SessionStats {
            user_id: self.user_id,
            conversation_count: self.messages,
            time_played_minutes: u32::try_from(minutes).unwrap_or(u32::MAX),
        }
    }
}

/// In-process registry of open chat sessions.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl SessionTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session for `user` starting at `now`.
    pub fn open(&self, user: UserId, now: DateTime<Utc>) -> SessionId {
        let session = SessionId::new();
        self.sessions.write().insert(
            session,
            SessionRecord {
                user_id: user,
                started_at: now,
                last_activity: now,
                messages: 0,
            },
        );
        debug!(user = %user, session = %session, "Session opened");
        session
    }

    /// Count one message in `session` at `now`.
    ///
    /// # Errors
    /// Returns `ReverieError::NotFound` if the session is not open.
    pub fn record_message(&self, session: SessionId, now: DateTime<Utc>) -> Result<SessionStats> {
        self.update(session, now, |record| {
            record.messages = record.messages.saturating_add(1);
        })
    }

    /// Mark activity in `session` without counting a message.
    ///
    /// # Errors
    /// Returns `ReverieError::NotFound` if the session is not open.
    pub fn touch(&self, session: SessionId, now: DateTime<Utc>) -> Result<SessionStats> {
        self.update(session, now, |_| {})
    }

    /// Close `session`. Returns its final stats, `None` if it was not open.
    pub fn close(&self, session: SessionId) -> Option<SessionStats> {
        let record = self.sessions.write().remove(&session)?;
        debug!(session = %session, messages = record.messages, "Session closed");
        Some(record.stats())
    }

    /// Current stats for `session`, if open.
    #[must_use]
    pub fn stats(&self, session: SessionId) -> Option<SessionStats> {
        self.sessions.read().get(&session).map(SessionRecord::stats)
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn update(
        &self,
        session: SessionId,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut SessionRecord),
    ) -> Result<SessionStats> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(&session)
            .ok_or_else(|| ReverieError::not_found("session", session))?;
        apply(record);
        // Out-of-order timestamps never move activity backwards.
        record.last_activity = record.last_activity.max(now);
        Ok(record.stats())
    }
}

impl SessionStatsProvider for SessionTracker {
    async fn session_stats(&self, session: SessionId) -> Result<Option<SessionStats>> {
        Ok(self.stats(session))
    }
}
