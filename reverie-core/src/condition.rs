//! Unlock conditions and their evaluator.
//!
//! Conditions are authored as a sparse table (every key optional) and held
//! as a set of tagged [`Condition`] variants, at most one per kind, in a
//! canonical order. Evaluation is the logical AND of every present
//! condition; an empty set is always satisfied.
//!
//! Everything here is a pure function of its inputs.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::affinity::{AFFINITY_MAX, AFFINITY_MIN};
use crate::error::{ReverieError, Result};
use crate::snapshot::ProgressionSnapshot;

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// One threshold over one snapshot signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// At least this many messages exchanged.
    ConversationCount(u32),
    /// Demon affinity at least this value.
    DemonAffinity(i32),
    /// Angel affinity at least this value.
    AngelAffinity(i32),
    /// Corruption at least this value.
    CorruptionValue(i32),
    /// Purity at least this value.
    PurityValue(i32),
    /// At least this many choices of any type.
    TotalChoices(u32),
    /// At least this many demon choices.
    DemonChoices(u32),
    /// At least this many angel choices.
    AngelChoices(u32),
    /// Every listed narrative choice has been made.
    SpecificChoices(BTreeSet<String>),
    /// At least this many minutes played.
    TimePlayedMinutes(u32),
}

impl Condition {
    /// Canonical position of this kind; also the identity used to forbid
    /// duplicate kinds in one condition set.
    fn rank(&self) -> u8 {
        match self {
            Self::ConversationCount(_) => 0,
            Self::DemonAffinity(_) => 1,
            Self::AngelAffinity(_) => 2,
            Self::CorruptionValue(_) => 3,
            Self::PurityValue(_) => 4,
            Self::TotalChoices(_) => 5,
            Self::DemonChoices(_) => 6,
            Self::AngelChoices(_) => 7,
            Self::SpecificChoices(_) => 8,
            Self::TimePlayedMinutes(_) => 9,
        }
    }

    /// Human-readable name of the signal this condition reads.
    #[must_use]
    pub fn signal_name(&self) -> &'static str {
        match self {
            Self::ConversationCount(_) => "conversations",
            Self::DemonAffinity(_) => "demon affinity",
            Self::AngelAffinity(_) => "angel affinity",
            Self::CorruptionValue(_) => "corruption",
            Self::PurityValue(_) => "purity",
            Self::TotalChoices(_) => "choices made",
            Self::DemonChoices(_) => "demon choices",
            Self::AngelChoices(_) => "angel choices",
            Self::SpecificChoices(_) => "specific choices",
            Self::TimePlayedMinutes(_) => "minutes played",
        }
    }

    /// `(current, required)` for numeric conditions; `None` for choice sets.
    fn numeric(&self, s: &ProgressionSnapshot) -> Option<(i64, i64)> {
        let pair = match self {
            Self::ConversationCount(min) => (i64::from(s.conversation_count), i64::from(*min)),
            Self::DemonAffinity(min) => (i64::from(s.demon_affinity), i64::from(*min)),
            Self::AngelAffinity(min) => (i64::from(s.angel_affinity), i64::from(*min)),
            Self::CorruptionValue(min) => (i64::from(s.corruption_value), i64::from(*min)),
            Self::PurityValue(min) => (i64::from(s.purity_value), i64::from(*min)),
            Self::TotalChoices(min) => (i64::from(s.total_choices), i64::from(*min)),
            Self::DemonChoices(min) => (i64::from(s.demon_choices), i64::from(*min)),
            Self::AngelChoices(min) => (i64::from(s.angel_choices), i64::from(*min)),
            Self::TimePlayedMinutes(min) => (i64::from(s.time_played_minutes), i64::from(*min)),
            Self::SpecificChoices(_) => return None,
        };
        Some(pair)
    }

    /// Whether the snapshot meets this threshold.
    #[must_use]
    pub fn is_satisfied(&self, s: &ProgressionSnapshot) -> bool {
        match self {
            Self::SpecificChoices(ids) => ids.iter().all(|id| s.has_chosen(id)),
            other => other
                .numeric(s)
                .is_some_and(|(current, required)| current >= required),
        }
    }

    /// Normalised distance to the threshold in `[0, 1]`; 0 when met.
    #[must_use]
    pub fn remaining(&self, s: &ProgressionSnapshot) -> f64 {
        match self {
            Self::SpecificChoices(ids) => {
                if ids.is_empty() {
                    return 0.0;
                }
                let missing = ids.iter().filter(|id| !s.has_chosen(id)).count();
                missing as f64 / ids.len() as f64
            }
            other => match other.numeric(s) {
                Some((current, required)) if required > 0 => {
                    (required - current).max(0) as f64 / required as f64
                }
                _ => 0.0,
            },
        }
    }

    /// Text describing how the condition was met, for trigger descriptions.
    #[must_use]
    pub fn satisfied_text(&self, s: &ProgressionSnapshot) -> String {
        match self {
            Self::SpecificChoices(ids) => format!("chose {}", join(ids)),
            other => match other.numeric(s) {
                Some((current, required)) => {
                    format!("{} {current} (needed {required})", other.signal_name())
                }
                None => other.to_string(),
            },
        }
    }

    /// Text telling the user what is still missing.
    #[must_use]
    pub fn hint_text(&self, s: &ProgressionSnapshot) -> String {
        match self {
            Self::SpecificChoices(ids) => {
                let missing: BTreeSet<String> =
                    ids.iter().filter(|id| !s.has_chosen(id)).cloned().collect();
                format!("Make the choice: {}", join(&missing))
            }
            other => match other.numeric(s) {
                Some((current, required)) => format!(
                    "Reach {required} {} (currently {current})",
                    other.signal_name()
                ),
                None => other.to_string(),
            },
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpecificChoices(ids) => write!(f, "choices {{{}}}", join(ids)),
            Self::ConversationCount(n)
            | Self::TotalChoices(n)
            | Self::DemonChoices(n)
            | Self::AngelChoices(n)
            | Self::TimePlayedMinutes(n) => write!(f, "{} >= {n}", self.signal_name()),
            Self::DemonAffinity(n)
            | Self::AngelAffinity(n)
            | Self::CorruptionValue(n)
            | Self::PurityValue(n) => write!(f, "{} >= {n}", self.signal_name()),
        }
    }
}

fn join(ids: &BTreeSet<String>) -> String {
    ids.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// Condition sets
// ---------------------------------------------------------------------------

/// Sparse authoring form of a condition set. Absent keys are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConditionTable {
    /// Minimum conversation count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_count: Option<u32>,
    /// Minimum demon affinity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demon_affinity: Option<i32>,
    /// Minimum angel affinity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angel_affinity: Option<i32>,
    /// Minimum corruption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corruption_value: Option<i32>,
    /// Minimum purity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purity_value: Option<i32>,
    /// Minimum total choices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_choices: Option<u32>,
    /// Minimum demon choices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demon_choices: Option<u32>,
    /// Minimum angel choices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angel_choices: Option<u32>,
    /// Narrative choices that must all have been made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specific_choices: Option<Vec<String>>,
    /// Minimum minutes played.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_played_minutes: Option<u32>,
}

/// A validated set of conditions, at most one per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConditionTable", into = "ConditionTable")]
pub struct UnlockConditions {
    conditions: Vec<Condition>,
}

impl UnlockConditions {
    /// The empty set: always satisfied.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Validate and canonicalise a set of conditions.
    ///
    /// # Errors
    /// Returns `ReverieError::Validation` for a repeated kind, an affinity
    /// threshold outside `[0, 100]`, or an empty/blank choice list.
    pub fn new(conditions: impl IntoIterator<Item = Condition>) -> Result<Self> {
        let mut conditions: Vec<Condition> = conditions.into_iter().collect();
        conditions.sort_by_key(Condition::rank);

        for pair in conditions.windows(2) {
            if pair[0].rank() == pair[1].rank() {
                return Err(ReverieError::Validation(format!(
                    "condition '{}' specified more than once",
                    pair[0].signal_name()
                )));
            }
        }

        for condition in &conditions {
            match condition {
                Condition::DemonAffinity(n)
                | Condition::AngelAffinity(n)
                | Condition::CorruptionValue(n)
                | Condition::PurityValue(n) => {
                    if !(AFFINITY_MIN..=AFFINITY_MAX).contains(n) {
                        return Err(ReverieError::Validation(format!(
                            "{} threshold {n} is outside [0, 100]",
                            condition.signal_name()
                        )));
                    }
                }
                Condition::SpecificChoices(ids) => {
                    if ids.is_empty() || ids.iter().any(|id| id.trim().is_empty()) {
                        return Err(ReverieError::Validation(
                            "specific_choices must list non-blank choice ids".to_string(),
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(Self { conditions })
    }

    /// Iterate conditions in canonical order.
    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.conditions.iter()
    }

    /// Number of present conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Whether no condition is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Mean normalised remaining distance across present conditions.
    #[must_use]
    pub fn remaining_distance(&self, snapshot: &ProgressionSnapshot) -> f64 {
        if self.conditions.is_empty() {
            return 0.0;
        }
        let total: f64 = self.conditions.iter().map(|c| c.remaining(snapshot)).sum();
        total / self.conditions.len() as f64
    }

    /// The unmet condition furthest from its threshold, first in canonical
    /// order on ties.
    #[must_use]
    pub fn dominant_remaining(&self, snapshot: &ProgressionSnapshot) -> Option<&Condition> {
        let mut best: Option<(&Condition, f64)> = None;
        for condition in &self.conditions {
            let remaining = condition.remaining(snapshot);
            if remaining <= 0.0 {
                continue;
            }
            if best.is_none_or(|(_, r)| remaining > r) {
                best = Some((condition, remaining));
            }
        }
        best.map(|(c, _)| c)
    }

    /// Trigger description for an unlock produced by `snapshot`.
    #[must_use]
    pub fn trigger_text(&self, snapshot: &ProgressionSnapshot) -> String {
        if self.conditions.is_empty() {
            return "Available from the start".to_string();
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| c.satisfied_text(snapshot))
            .collect();
        format!("Unlocked by {}", parts.join("; "))
    }
}

impl<'a> IntoIterator for &'a UnlockConditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}

impl TryFrom<ConditionTable> for UnlockConditions {
    type Error = ReverieError;

    fn try_from(table: ConditionTable) -> Result<Self> {
        let mut conditions = Vec::new();
        if let Some(n) = table.conversation_count {
            conditions.push(Condition::ConversationCount(n));
        }
        if let Some(n) = table.demon_affinity {
            conditions.push(Condition::DemonAffinity(n));
        }
        if let Some(n) = table.angel_affinity {
            conditions.push(Condition::AngelAffinity(n));
        }
        if let Some(n) = table.corruption_value {
            conditions.push(Condition::CorruptionValue(n));
        }
        if let Some(n) = table.purity_value {
            conditions.push(Condition::PurityValue(n));
        }
        if let Some(n) = table.total_choices {
            conditions.push(Condition::TotalChoices(n));
        }
        if let Some(n) = table.demon_choices {
            conditions.push(Condition::DemonChoices(n));
        }
        if let Some(n) = table.angel_choices {
            conditions.push(Condition::AngelChoices(n));
        }
        // An empty list constrains nothing and is treated as absent.
        if let Some(ids) = table.specific_choices.filter(|ids| !ids.is_empty()) {
            conditions.push(Condition::SpecificChoices(ids.into_iter().collect()));
        }
        if let Some(n) = table.time_played_minutes {
            conditions.push(Condition::TimePlayedMinutes(n));
        }
        Self::new(conditions)
    }
}

impl From<UnlockConditions> for ConditionTable {
    fn from(set: UnlockConditions) -> Self {
        let mut table = Self::default();
        for condition in set.conditions {
            match condition {
                Condition::ConversationCount(n) => table.conversation_count = Some(n),
                Condition::DemonAffinity(n) => table.demon_affinity = Some(n),
                Condition::AngelAffinity(n) => table.angel_affinity = Some(n),
                Condition::CorruptionValue(n) => table.corruption_value = Some(n),
                Condition::PurityValue(n) => table.purity_value = Some(n),
                Condition::TotalChoices(n) => table.total_choices = Some(n),
                Condition::DemonChoices(n) => table.demon_choices = Some(n),
                Condition::AngelChoices(n) => table.angel_choices = Some(n),
                Condition::SpecificChoices(ids) => {
                    table.specific_choices = Some(ids.into_iter().collect());
                }
                Condition::TimePlayedMinutes(n) => table.time_played_minutes = Some(n),
            }
        }
        table
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Whether `snapshot` satisfies every present condition.
#[must_use]
pub fn evaluate(conditions: &UnlockConditions, snapshot: &ProgressionSnapshot) -> bool {
    conditions.iter().all(|c| c.is_satisfied(snapshot))
}
