//! Affinity tracking — the mutable demon/angel alignment of a user.
//!
//! Choices move four bounded scores (demon affinity, angel affinity,
//! corruption, purity) and three tallies. Values saturate at `[0, 100]`;
//! arithmetic never fails. Balance status and the personality suggestion
//! are derived on read from the current state and a configurable table.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::choice::ChoiceEvent;
use crate::config::AffinityConfig;
use crate::error::{ReverieError, Result};
use crate::response::AffinityResponse;
use crate::types::UserId;

/// Lower bound of every affinity-type score.
pub const AFFINITY_MIN: i32 = 0;
/// Upper bound of every affinity-type score.
pub const AFFINITY_MAX: i32 = 100;

// ---------------------------------------------------------------------------
// Choice types
// ---------------------------------------------------------------------------

/// The alignment of a single narrative choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceType {
    /// Sided with the demon.
    Demon,
    /// Sided with the angel.
    Angel,
    /// Took neither side.
    Neutral,
}

impl ChoiceType {
    /// Wire name of the choice type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demon => "demon",
            Self::Angel => "angel",
            Self::Neutral => "neutral",
        }
    }
}

impl FromStr for ChoiceType {
    type Err = ReverieError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demon" => Ok(Self::Demon),
            "angel" => Ok(Self::Angel),
            "neutral" => Ok(Self::Neutral),
            other => Err(ReverieError::Validation(format!(
                "unrecognised choice type '{other}' (expected demon, angel or neutral)"
            ))),
        }
    }
}

impl fmt::Display for ChoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed per-field changes carried by one choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityDeltas {
    /// Change to demon affinity.
    #[serde(default)]
    pub demon_affinity: i32,
    /// Change to angel affinity.
    #[serde(default)]
    pub angel_affinity: i32,
    /// Change to corruption.
    #[serde(default)]
    pub corruption_value: i32,
    /// Change to purity.
    #[serde(default)]
    pub purity_value: i32,
}

impl AffinityDeltas {
    fn fields(&self) -> [(&'static str, i32); 4] {
        [
            ("demon_affinity", self.demon_affinity),
            ("angel_affinity", self.angel_affinity),
            ("corruption_value", self.corruption_value),
            ("purity_value", self.purity_value),
        ]
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Per-user affinity state. Created all-zero on first access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityState {
    /// Demon affinity, 0–100.
    pub demon_affinity: i32,
    /// Angel affinity, 0–100.
    pub angel_affinity: i32,
    /// Corruption, 0–100.
    pub corruption_value: i32,
    /// Purity, 0–100.
    pub purity_value: i32,
    /// Every choice ever applied.
    pub total_choices: u32,
    /// Choices of type demon.
    pub demon_choices: u32,
    /// Choices of type angel.
    pub angel_choices: u32,
    /// Type of the most recent choice, `None` before the first.
    pub last_choice_type: Option<ChoiceType>,
    /// Timestamp of the most recent choice.
    pub updated_at: Option<DateTime<Utc>>,
}

impl AffinityState {
    /// Fresh all-zero state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Choices that were neither demon nor angel.
    #[must_use]
    pub fn neutral_choices(&self) -> u32 {
        self.total_choices
            .saturating_sub(self.demon_choices)
            .saturating_sub(self.angel_choices)
    }

    /// Apply one choice: add deltas, saturate, bump tallies.
    ///
    /// Deltas are not validated here; callers go through
    /// [`AffinityTracker::apply`] for submitted input.
    pub fn apply(&mut self, choice: ChoiceType, deltas: &AffinityDeltas, at: DateTime<Utc>) {
        self.demon_affinity = saturate(self.demon_affinity, deltas.demon_affinity);
        self.angel_affinity = saturate(self.angel_affinity, deltas.angel_affinity);
        self.corruption_value = saturate(self.corruption_value, deltas.corruption_value);
        self.purity_value = saturate(self.purity_value, deltas.purity_value);

        self.total_choices = self.total_choices.saturating_add(1);
        match choice {
            ChoiceType::Demon => self.demon_choices = self.demon_choices.saturating_add(1),
            ChoiceType::Angel => self.angel_choices = self.angel_choices.saturating_add(1),
            ChoiceType::Neutral => {}
        }
        self.last_choice_type = Some(choice);
        self.updated_at = Some(at);
    }

    /// Clamp any out-of-range field in place.
    ///
    /// Returns one [`ReverieError::StateInconsistency`] per repaired field so
    /// the caller can log them; the state is usable afterwards either way.
    pub fn repair(&mut self, user: UserId) -> Vec<ReverieError> {
        let mut repaired = Vec::new();
        for (field, value) in [
            ("demon_affinity", &mut self.demon_affinity),
            ("angel_affinity", &mut self.angel_affinity),
            ("corruption_value", &mut self.corruption_value),
            ("purity_value", &mut self.purity_value),
        ] {
            if !(AFFINITY_MIN..=AFFINITY_MAX).contains(value) {
                repaired.push(ReverieError::StateInconsistency {
                    user,
                    field,
                    value: *value,
                    expected: "must be within [0, 100]",
                });
                *value = (*value).clamp(AFFINITY_MIN, AFFINITY_MAX);
            }
        }

        let sided = self.demon_choices.saturating_add(self.angel_choices);
        if sided > self.total_choices {
            repaired.push(ReverieError::StateInconsistency {
                user,
                field: "total_choices",
                value: i32::try_from(self.total_choices).unwrap_or(i32::MAX),
                expected: "must be at least demon_choices + angel_choices",
            });
            self.total_choices = sided;
        }
        repaired
    }
}

fn saturate(value: i32, delta: i32) -> i32 {
    value.saturating_add(delta).clamp(AFFINITY_MIN, AFFINITY_MAX)
}

// ---------------------------------------------------------------------------
// Derived fields
// ---------------------------------------------------------------------------

/// Relative dominance of demon vs angel affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    /// Demon affinity leads by more than the threshold.
    DemonDominant,
    /// Angel affinity leads by more than the threshold.
    AngelDominant,
    /// Neither side leads by more than the threshold.
    Balanced,
}

impl BalanceStatus {
    /// Classify a state against a dominance threshold.
    #[must_use]
    pub fn classify(state: &AffinityState, threshold: i32) -> Self {
        let gap = state.demon_affinity - state.angel_affinity;
        if gap > threshold {
            Self::DemonDominant
        } else if -gap > threshold {
            Self::AngelDominant
        } else {
            Self::Balanced
        }
    }
}

/// Companion personality the chat layer should lean toward next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    /// The companion's baseline voice.
    Default,
    /// Corruption-leaning voice.
    Corrupted,
    /// Purity-leaning voice.
    Pure,
    /// Playful demon-side voice.
    Mischievous,
    /// Devoted angel-side voice.
    Devoted,
}

/// Condition column of the personality priority table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityTrigger {
    /// Corruption at or above the value.
    CorruptionAtLeast(i32),
    /// Purity at or above the value.
    PurityAtLeast(i32),
    /// Balance status equal to the value.
    Balance(BalanceStatus),
}

impl PersonalityTrigger {
    fn matches(self, state: &AffinityState, balance: BalanceStatus) -> bool {
        match self {
            Self::CorruptionAtLeast(min) => state.corruption_value >= min,
            Self::PurityAtLeast(min) => state.purity_value >= min,
            Self::Balance(status) => balance == status,
        }
    }
}

/// One row of the personality priority table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalityRule {
    /// When this row applies.
    pub when: PersonalityTrigger,
    /// What it suggests.
    pub suggest: Personality,
}

/// The shipped table: corruption ≥ 70, then purity ≥ 70, else default.
#[must_use]
pub fn default_personality_rules() -> Vec<PersonalityRule> {
    vec![
        PersonalityRule {
            when: PersonalityTrigger::CorruptionAtLeast(70),
            suggest: Personality::Corrupted,
        },
        PersonalityRule {
            when: PersonalityTrigger::PurityAtLeast(70),
            suggest: Personality::Pure,
        },
    ]
}

/// First matching row wins; no match yields [`Personality::Default`].
#[must_use]
pub fn resolve_personality(
    rules: &[PersonalityRule],
    state: &AffinityState,
    balance: BalanceStatus,
) -> Personality {
    rules
        .iter()
        .find(|rule| rule.when.matches(state, balance))
        .map_or(Personality::Default, |rule| rule.suggest)
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Applies validated choices to affinity state and derives read-side fields.
#[derive(Debug, Clone)]
pub struct AffinityTracker {
    config: AffinityConfig,
}

impl AffinityTracker {
    /// Create a tracker with the given thresholds and tables.
    #[must_use]
    pub fn new(config: AffinityConfig) -> Self {
        Self { config }
    }

    /// Reject deltas whose magnitude exceeds the configured bound.
    ///
    /// # Errors
    /// Returns `ReverieError::Validation` naming the first offending field.
    pub fn validate_deltas(&self, deltas: &AffinityDeltas) -> Result<()> {
        let bound = self.config.max_delta_magnitude;
        for (field, delta) in deltas.fields() {
            if delta.unsigned_abs() > bound.unsigned_abs() {
                return Err(ReverieError::Validation(format!(
                    "{field} delta {delta} exceeds the allowed magnitude of {bound}"
                )));
            }
        }
        Ok(())
    }

    /// Validate and apply one choice. Nothing changes on error.
    ///
    /// # Errors
    /// Returns `ReverieError::Validation` for out-of-bounds deltas.
    pub fn apply(
        &self,
        state: &mut AffinityState,
        choice: ChoiceType,
        deltas: &AffinityDeltas,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.validate_deltas(deltas)?;
        state.apply(choice, deltas, at);
        Ok(())
    }

    /// Balance status under the configured threshold.
    #[must_use]
    pub fn balance_status(&self, state: &AffinityState) -> BalanceStatus {
        BalanceStatus::classify(state, self.config.balance_threshold)
    }

    /// Personality suggestion from the configured table.
    #[must_use]
    pub fn personality(&self, state: &AffinityState) -> Personality {
        resolve_personality(
            &self.config.personality_rules,
            state,
            self.balance_status(state),
        )
    }

    /// Public view of a state with its derived fields.
    #[must_use]
    pub fn respond(&self, state: &AffinityState) -> AffinityResponse {
        AffinityResponse {
            demon_affinity: state.demon_affinity,
            angel_affinity: state.angel_affinity,
            corruption_value: state.corruption_value,
            purity_value: state.purity_value,
            total_choices: state.total_choices,
            demon_choices: state.demon_choices,
            angel_choices: state.angel_choices,
            neutral_choices: state.neutral_choices(),
            last_choice_type: state.last_choice_type,
            balance_status: self.balance_status(state),
            next_personality_suggestion: self.personality(state),
        }
    }

    /// Rebuild a state from its event log, applied in timestamp order.
    #[must_use]
    pub fn replay(&self, events: &[ChoiceEvent]) -> AffinityState {
        let mut ordered: Vec<&ChoiceEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.occurred_at);

        let mut state = AffinityState::new();
        for event in ordered {
            state.apply(event.choice_type, &event.deltas, event.occurred_at);
        }
        state
    }
}

impl Default for AffinityTracker {
    fn default() -> Self {
        Self::new(AffinityConfig::default())
    }
}
