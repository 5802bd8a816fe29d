//! # reverie-chat — Chat Integration for Reverie
//!
//! This crate sits between a chat front end and the game-agnostic
//! `reverie-core` progression service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Chat front end            │
//! │  ┌───────────────────────────────────┐  │
//! │  │          reverie-chat             │  │
//! │  │  ┌─────────────┐ ┌─────────────┐  │  │
//! │  │  │ RateLimiter │ │  Sessions   │  │  │
//! │  │  └──────┬──────┘ └──────┬──────┘  │  │
//! │  │         ▼               ▼         │  │
//! │  │    ┌─────────────────────────┐    │  │
//! │  │    │     ChatController      │    │  │
//! │  │    └────────────┬────────────┘    │  │
//! │  │                 ▼                 │  │
//! │  │    ┌─────────────────────────┐    │  │
//! │  │    │      reverie-core       │    │  │
//! │  │    └─────────────────────────┘    │  │
//! │  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config` — rate limit and message limits, loaded from TOML
//! - `controller` — routes chat events into the progression service
//! - `error` — chat-level error type wrapping core errors
//! - `events` — inbound chat events
//! - `ratelimit` — bounded per-user fixed-window limiter
//! - `session` — session tracker feeding conversation stats to the core

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod ratelimit;
pub mod session;

pub use config::ChatConfig;
pub use controller::{ChatController, ChatReply};
pub use error::{ChatError, ChatResult};
pub use events::ChatEvent;
pub use ratelimit::RateLimiter;
pub use session::SessionTracker;
