//! # Reverie Core Library
//!
//! Progression engine for a companion-chat application.
//!
//! A user's narrative choices move a bounded affinity state (demon and angel
//! affinity, corruption, purity, choice tallies). Together with
//! conversation-derived counters that state decides when narrative
//! **memory fragments** unlock:
//!
//! - [`affinity`] — applies choices, derives balance and personality
//! - [`condition`] — pure evaluation of a fragment's unlock conditions
//! - [`unlock`] — idempotent unlock transitions in `(category, order)` order
//! - [`progress`] — totals, per-category breakdown, recent unlocks, hints
//! - [`service`] — the async orchestrator over a [`store::ProgressStore`]
//!
//! ## Guarantees
//!
//! - Affinity values never leave `[0, 100]`; arithmetic never fails.
//! - An unlock happens at most once per user and fragment.
//! - Re-evaluating an unchanged snapshot is a no-op.
//! - Mutations of one user are serialised; different users never contend.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod affinity;
pub mod choice;
pub mod condition;
pub mod config;
pub mod error;
pub mod fragment;
pub mod locks;
pub mod metrics;
pub mod persistence;
pub mod progress;
pub mod response;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod unlock;

pub use affinity::{AffinityDeltas, AffinityState, AffinityTracker, BalanceStatus, ChoiceType, Personality};
pub use choice::{ChoiceEvent, ChoiceSubmission};
pub use condition::{evaluate, Condition, UnlockConditions};
pub use config::ReverieConfig;
pub use error::{ReverieError, Result};
pub use fragment::{FragmentCategory, FragmentDefinition, FragmentRegistry, Rarity};
pub use persistence::SqliteStore;
pub use progress::{ProgressReporter, ProgressSummary};
pub use response::{AffinityResponse, ChoiceOutcome, MemoryFragmentResponse, MemoryProgressResponse};
pub use service::ProgressionService;
pub use snapshot::ProgressionSnapshot;
pub use store::{MemorySessions, MemoryStore, ProgressStore, SessionStatsProvider};
pub use types::*;
pub use unlock::{UnlockEngine, UnlockLedger, UnlockRecord};
