//! Per-user fixed-window rate limiter.
//!
//! Each user gets a window that opens on their first event and lasts
//! `window_seconds`. At most `max_events_per_window` events are admitted per
//! window. The table is an LRU bounded by `max_tracked_users`, so memory use
//! stays flat no matter how many users show up; an evicted user simply starts
//! a fresh window.
//!
//! The clock is passed in by the caller, which keeps the limiter
//! deterministic under test.

use lru::LruCache;
use parking_lot::Mutex;
use reverie_core::types::UserId;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::error::{ChatError, ChatResult};

#[derive(Debug, Clone, Copy)]
struct Window {
    opened_at: u64,
    events: u32,
}

/// Bounded, injectable rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<LruCache<UserId, Window>>,
    max_events: u32,
    window_seconds: u64,
}

impl RateLimiter {
    /// Build a limiter from configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(LruCache::new(config.capacity())),
            max_events: config.max_events_per_window,
            window_seconds: config.window_seconds,
        }
    }

    /// Admit one event for `user` at `now_secs` (seconds since any fixed
    /// epoch), or reject it.
    ///
    /// Rejected events are not counted.
    ///
    /// # Errors
    /// Returns `ChatError::RateLimited` if the user's window is full.
    pub fn check_and_record(&self, user: UserId, now_secs: u64) -> ChatResult<()> {
        let mut windows = self.windows.lock();
        let window = windows.get_or_insert_mut(user, || Window {
            opened_at: now_secs,
            events: 0,
        });

        if now_secs.saturating_sub(window.opened_at) >= self.window_seconds {
            *window = Window {
                opened_at: now_secs,
                events: 0,
            };
        }

        if window.events >= self.max_events {
            debug!(user = %user, events = window.events, "Rate limit hit");
            return Err(ChatError::RateLimited { user });
        }
        window.events += 1;
        Ok(())
    }

    /// Events admitted for `user` in their current window.
    #[must_use]
    pub fn events_in_window(&self, user: UserId) -> u32 {
        self.windows.lock().peek(&user).map_or(0, |w| w.events)
    }

    /// Number of users currently tracked.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.windows.lock().len()
    }
}
