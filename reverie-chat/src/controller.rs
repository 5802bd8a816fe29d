//! Chat controller — routes chat events into the progression service.
//!
//! For every event the controller:
//!
//! 1. Rejects empty or oversized message text.
//! 2. Admits it through the per-user [`RateLimiter`].
//! 3. Checks that the session is open and owned by the sender.
//! 4. Updates the [`SessionTracker`] (messages are counted, choices only
//!    mark activity).
//! 5. Calls the progression service and shapes a [`ChatReply`] with any
//!    fragments that unlocked inline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reverie_core::config::ReverieConfig;
use reverie_core::error::ReverieError;
use reverie_core::fragment::FragmentRegistry;
use reverie_core::response::{AffinityResponse, MemoryFragmentResponse, MemoryProgressResponse};
use reverie_core::service::ProgressionService;
use reverie_core::store::ProgressStore;
use reverie_core::types::{SessionId, SessionStats, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ChatConfig, MessageConfig};
use crate::error::{ChatError, ChatResult};
use crate::events::ChatEvent;
use crate::ratelimit::RateLimiter;
use crate::session::SessionTracker;

/// What the chat front end shows after an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Updated affinity, present after a choice.
    pub affinity: Option<AffinityResponse>,
    /// Fragments unlocked by this event, in unlock order.
    pub unlocked: Vec<MemoryFragmentResponse>,
}

impl ChatReply {
    /// Whether the event unlocked anything.
    #[must_use]
    pub fn has_unlocks(&self) -> bool {
        !self.unlocked.is_empty()
    }
}

/// Progression service wired to the controller's own session tracker.
pub type ChatService<S> = ProgressionService<S, Arc<SessionTracker>>;

/// Entry point for chat front ends.
#[derive(Debug)]
pub struct ChatController<S> {
    service: Arc<ChatService<S>>,
    sessions: Arc<SessionTracker>,
    limiter: RateLimiter,
    messages: MessageConfig,
}

impl<S: ProgressStore> ChatController<S> {
    /// Build a controller over an already loaded registry.
    #[must_use]
    pub fn new(config: &ReverieConfig, chat: &ChatConfig, registry: Arc<FragmentRegistry>, store: S) -> Self {
        let sessions = Arc::new(SessionTracker::new());
        let service = ProgressionService::new(config, registry, store, Arc::clone(&sessions));
        Self {
            service: Arc::new(service),
            sessions,
            limiter: RateLimiter::new(&chat.rate_limit),
            messages: chat.messages.clone(),
        }
    }

    /// Build a controller, loading the catalog named by `config`.
    ///
    /// # Errors
    /// Returns `ChatError::Progression` if the catalog cannot be loaded.
    pub fn from_config(config: &ReverieConfig, chat: &ChatConfig, store: S) -> ChatResult<Self> {
        let registry = FragmentRegistry::load(config.catalog.path.as_deref())?;
        Ok(Self::new(config, chat, Arc::new(registry), store))
    }

    /// Open a chat session for `user`.
    pub fn open_session(&self, user: UserId, now: DateTime<Utc>) -> SessionId {
        self.sessions.open(user, now)
    }

    /// Close a session, returning its final counters.
    pub fn close_session(&self, session: SessionId) -> Option<SessionStats> {
        self.sessions.close(session)
    }

    /// Handle one chat event.
    ///
    /// Rejected message text does not count against the rate limit.
    ///
    /// # Errors
    /// - `RateLimited` if the user is over their window budget.
    /// - `EmptyMessage` / `MessageTooLong` for rejected message text.
    /// - `Progression(NotFound)` for an unknown or foreign session.
    /// - `Progression(..)` for any other service failure.
    pub async fn handle(&self, event: ChatEvent) -> ChatResult<ChatReply> {
        let user = event.user();
        let session = event.session();
        let sent_at = event.sent_at();
        if let ChatEvent::Message { text, .. } = &event {
            self.validate_message(text)?;
        }
        self.limiter
            .check_and_record(user, u64::try_from(sent_at.timestamp()).unwrap_or(0))?;
        debug!(user = %user, session = %session, kind = event.kind(), "Chat event received");

        let reply = match event {
            ChatEvent::Message { .. } => {
                self.owned_session(user, session)?;
                self.sessions.record_message(session, sent_at)?;
                let unlocked = self.service.process_message(user, session).await?;
                ChatReply {
                    affinity: None,
                    unlocked,
                }
            }
            ChatEvent::Choice { submission, .. } => {
                self.owned_session(user, session)?;
                self.sessions.touch(session, sent_at)?;
                let outcome = self.service.apply_choice(user, session, submission).await?;
                ChatReply {
                    affinity: Some(outcome.affinity),
                    unlocked: outcome.unlocked,
                }
            }
        };

        if reply.has_unlocks() {
            info!(user = %user, session = %session, unlocked = reply.unlocked.len(), "Chat reply carries unlocks");
        }
        Ok(reply)
    }

    /// Progress summary for the memory screen.
    ///
    /// # Errors
    /// Same as [`ProgressionService::memory_progress`].
    pub async fn progress(&self, user: UserId, session: SessionId) -> ChatResult<MemoryProgressResponse> {
        Ok(self.service.memory_progress(user, session).await?)
    }

    /// The underlying progression service.
    #[must_use]
    pub fn service(&self) -> &Arc<ChatService<S>> {
        &self.service
    }

    /// The session tracker feeding the service.
    #[must_use]
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// The rate limiter guarding [`handle`](Self::handle).
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn validate_message(&self, text: &str) -> ChatResult<()> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let len = text.chars().count();
        if len > self.messages.max_chars {
            return Err(ChatError::MessageTooLong {
                len,
                max: self.messages.max_chars,
            });
        }
        Ok(())
    }

    fn owned_session(&self, user: UserId, session: SessionId) -> ChatResult<()> {
        match self.sessions.stats(session) {
            Some(stats) if stats.user_id == user => Ok(()),
            _ => Err(ReverieError::not_found("session", session).into()),
        }
    }
}
