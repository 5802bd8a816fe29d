//! Fixtures shared by the Reverie benchmarks.
//!
//! Builds synthetic catalogs and snapshots large enough to make the
//! evaluation and reporting paths measurable.

#![deny(missing_docs)]

use std::collections::BTreeSet;

use reverie_core::condition::{Condition, UnlockConditions};
use reverie_core::fragment::{FragmentCategory, FragmentDefinition, FragmentRegistry, Rarity};
use reverie_core::snapshot::ProgressionSnapshot;
use reverie_core::types::FragmentId;
use reverie_core::unlock::UnlockLedger;

/// A registry with `per_category` fragments in each category.
///
/// Thresholds climb with `order`, and every third fragment also requires a
/// narrative choice, so a mid-range snapshot unlocks roughly half.
///
/// # Panics
/// Panics if the generated catalog is invalid, which would be a bug here.
#[must_use]
pub fn synthetic_registry(per_category: u32) -> FragmentRegistry {
    let mut fragments = Vec::new();
    for category in FragmentCategory::ALL {
        for order in 1..=per_category {
            let step = i32::try_from(order * 100 / per_category.max(1)).unwrap_or(100).min(100);
            let mut conditions = vec![
                Condition::ConversationCount(order * 2),
                match category {
                    FragmentCategory::Corruption => Condition::CorruptionValue(step),
                    FragmentCategory::Purity => Condition::PurityValue(step),
                    FragmentCategory::Bond => Condition::AngelAffinity(step),
                    _ => Condition::DemonAffinity(step),
                },
            ];
            if order % 3 == 0 {
                conditions.push(Condition::SpecificChoices(BTreeSet::from([format!("choice_{order}")])));
            }
            fragments.push(FragmentDefinition {
                id: FragmentId::new(format!("{}_{order}", category.as_str())),
                category,
                order,
                rarity: Rarity::Common,
                title: format!("{} #{order}", category.as_str()),
                description: String::new(),
                content: "…".to_string(),
                conditions: UnlockConditions::new(conditions).expect("synthetic conditions are valid"),
            });
        }
    }
    FragmentRegistry::new(fragments).expect("synthetic catalog is valid")
}

/// A snapshot with every score at `level` and a choice history of the
/// first `choices` narrative ids.
#[must_use]
pub fn snapshot_at(level: i32, choices: u32) -> ProgressionSnapshot {
    ProgressionSnapshot {
        conversation_count: u32::try_from(level).unwrap_or(0),
        demon_affinity: level,
        angel_affinity: level,
        corruption_value: level,
        purity_value: level,
        total_choices: choices,
        demon_choices: choices / 2,
        angel_choices: choices / 2,
        time_played_minutes: u32::try_from(level).unwrap_or(0) * 3,
        choice_history: (1..=choices).map(|i| format!("choice_{i}")).collect(),
    }
}

/// An empty ledger; everything locked.
#[must_use]
pub fn fresh_ledger() -> UnlockLedger {
    UnlockLedger::new()
}
