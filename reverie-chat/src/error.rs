//! Error types for the chat integration layer.

use reverie_core::error::ReverieError;
use reverie_core::types::UserId;
use thiserror::Error;

/// Errors raised while handling a chat event.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The user exceeded the configured events per window.
    #[error("rate limited: user {user}")]
    RateLimited {
        /// Offending user.
        user: UserId,
    },

    /// The message is longer than `messages.max_chars`.
    #[error("message too long: {len} chars (max {max})")]
    MessageTooLong {
        /// Length of the rejected message, in chars.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// The message was empty after trimming whitespace.
    #[error("message is empty")]
    EmptyMessage,

    /// The progression service rejected or failed the request.
    #[error(transparent)]
    Progression(#[from] ReverieError),
}

impl ChatError {
    /// Whether retrying the same event later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Progression(e) => e.is_retryable(),
            Self::MessageTooLong { .. } | Self::EmptyMessage => false,
        }
    }
}

/// Convenience alias for chat results.
pub type ChatResult<T> = std::result::Result<T, ChatError>;
