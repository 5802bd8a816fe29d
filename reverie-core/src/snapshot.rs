//! Progression snapshots — the flattened input of every unlock evaluation.
//!
//! A snapshot is rebuilt for each evaluation from the stored affinity state,
//! the session provider's counters and the user's choice history. Time is
//! injected through `time_played_minutes`; nothing downstream reads a clock.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::affinity::AffinityState;
use crate::choice::ChoiceEvent;
use crate::types::SessionStats;

/// Point-in-time view of every signal an unlock condition can reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionSnapshot {
    /// Messages exchanged.
    pub conversation_count: u32,
    /// Demon affinity, 0–100.
    pub demon_affinity: i32,
    /// Angel affinity, 0–100.
    pub angel_affinity: i32,
    /// Corruption, 0–100.
    pub corruption_value: i32,
    /// Purity, 0–100.
    pub purity_value: i32,
    /// All choices made.
    pub total_choices: u32,
    /// Demon choices made.
    pub demon_choices: u32,
    /// Angel choices made.
    pub angel_choices: u32,
    /// Minutes played.
    pub time_played_minutes: u32,
    /// Narrative ids of every choice the user has made.
    pub choice_history: BTreeSet<String>,
}

impl ProgressionSnapshot {
    /// Combine affinity state, session counters and choice history.
    #[must_use]
    pub fn build<'a>(
        state: &AffinityState,
        session: &SessionStats,
        history: impl IntoIterator<Item = &'a ChoiceEvent>,
    ) -> Self {
        Self {
            conversation_count: session.conversation_count,
            demon_affinity: state.demon_affinity,
            angel_affinity: state.angel_affinity,
            corruption_value: state.corruption_value,
            purity_value: state.purity_value,
            total_choices: state.total_choices,
            demon_choices: state.demon_choices,
            angel_choices: state.angel_choices,
            time_played_minutes: session.time_played_minutes,
            choice_history: history.into_iter().map(|e| e.choice_id.clone()).collect(),
        }
    }

    /// Whether the user has made the given narrative choice.
    #[must_use]
    pub fn has_chosen(&self, choice_id: &str) -> bool {
        self.choice_history.contains(choice_id)
    }
}
