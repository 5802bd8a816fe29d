//! Public read models returned to the chat layer.
//!
//! These are plain serialisable views. They never carry more than the user
//! is allowed to see: a locked fragment's content stays `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::affinity::{BalanceStatus, ChoiceType, Personality};
use crate::fragment::{FragmentCategory, FragmentDefinition, Rarity};
use crate::progress::ProgressSummary;
use crate::types::FragmentId;
use crate::unlock::{UnlockRecord, UnlockedFragment};

/// Affinity state plus its derived fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityResponse {
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
    /// Neutral choices made.
    pub neutral_choices: u32,
    /// Alignment of the latest choice.
    pub last_choice_type: Option<ChoiceType>,
    /// Which side currently dominates.
    pub balance_status: BalanceStatus,
    /// Voice the companion should lean toward.
    pub next_personality_suggestion: Personality,
}

/// Public view of one fragment for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFragmentResponse {
    /// Fragment id.
    pub id: FragmentId,
    /// Category.
    pub category: FragmentCategory,
    /// Position in category.
    pub order: u32,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Display title.
    pub title: String,
    /// Teaser text.
    pub description: String,
    /// Full text; `None` while locked.
    pub content: Option<String>,
    /// Whether the user has unlocked it.
    pub is_unlocked: bool,
    /// When it unlocked.
    pub unlocked_at: Option<DateTime<Utc>>,
    /// Why it unlocked.
    pub trigger: Option<String>,
    /// How often it has been opened.
    pub view_count: u32,
}

impl MemoryFragmentResponse {
    /// Combine a definition with the user's record (missing = locked).
    #[must_use]
    pub fn new(fragment: &FragmentDefinition, record: Option<&UnlockRecord>) -> Self {
        let unlocked = record.filter(|r| r.is_unlocked);
        Self {
            id: fragment.id.clone(),
            category: fragment.category,
            order: fragment.order,
            rarity: fragment.rarity,
            title: fragment.title.clone(),
            description: fragment.description.clone(),
            content: unlocked.map(|_| fragment.content.clone()),
            is_unlocked: unlocked.is_some(),
            unlocked_at: unlocked.and_then(|r| r.unlocked_at),
            trigger: unlocked.and_then(|r| r.trigger.clone()),
            view_count: record.map_or(0, |r| r.view_count),
        }
    }
}

impl From<&UnlockedFragment> for MemoryFragmentResponse {
    fn from(unlocked: &UnlockedFragment) -> Self {
        Self::new(&unlocked.fragment, Some(&unlocked.record))
    }
}

/// The full progress report.
pub type MemoryProgressResponse = ProgressSummary;

/// Result of applying one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOutcome {
    /// Affinity after the choice.
    pub affinity: AffinityResponse,
    /// Fragments the choice unlocked, in unlock order.
    pub unlocked: Vec<MemoryFragmentResponse>,
    /// Fragments that qualified but could not be saved. They stay locked
    /// and unlock on a later pass.
    #[serde(default)]
    pub deferred: Vec<FragmentId>,
}
