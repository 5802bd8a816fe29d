//! Inbound chat events routed by the [`ChatController`](crate::ChatController).

use chrono::{DateTime, Utc};
use reverie_core::choice::ChoiceSubmission;
use reverie_core::types::{SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Something a user did in a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The user sent a chat message.
    Message {
        /// Sender.
        user: UserId,
        /// Session the message belongs to.
        session: SessionId,
        /// Raw message text.
        text: String,
        /// When the message arrived.
        sent_at: DateTime<Utc>,
    },

    /// The user picked a narrative choice.
    Choice {
        /// Who chose.
        user: UserId,
        /// Session the choice was offered in.
        session: SessionId,
        /// The choice as submitted.
        submission: ChoiceSubmission,
        /// When the choice arrived.
        sent_at: DateTime<Utc>,
    },
}

impl ChatEvent {
    /// The acting user.
    #[must_use]
    pub fn user(&self) -> UserId {
        match self {
            Self::Message { user, .. } | Self::Choice { user, .. } => *user,
        }
    }

    /// The session the event belongs to.
    #[must_use]
    pub fn session(&self) -> SessionId {
        match self {
            Self::Message { session, .. } | Self::Choice { session, .. } => *session,
        }
    }

    /// When the event arrived.
    #[must_use]
    pub fn sent_at(&self) -> DateTime<Utc> {
        match self {
            Self::Message { sent_at, .. } | Self::Choice { sent_at, .. } => *sent_at,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Choice { .. } => "choice",
        }
    }
}
