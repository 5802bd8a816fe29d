//! Property-Based Tests for Reverie Core
//!
//! Uses `proptest` to check the progression invariants under random inputs:
//! single-threshold evaluation, clamping, tallies, idempotent unlocks and
//! deterministic ordering.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use reverie_core::affinity::{AffinityDeltas, AffinityState, AffinityTracker, ChoiceType};
use reverie_core::condition::{evaluate, Condition, UnlockConditions};
use reverie_core::fragment::{FragmentCategory, FragmentDefinition, FragmentRegistry, Rarity};
use reverie_core::snapshot::ProgressionSnapshot;
use reverie_core::types::FragmentId;
use reverie_core::unlock::{UnlockEngine, UnlockLedger};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_choice_type() -> impl Strategy<Value = ChoiceType> {
    prop_oneof![
        Just(ChoiceType::Demon),
        Just(ChoiceType::Angel),
        Just(ChoiceType::Neutral),
    ]
}

fn arb_deltas() -> impl Strategy<Value = AffinityDeltas> {
    (-100..=100i32, -100..=100i32, -100..=100i32, -100..=100i32).prop_map(|(d, a, c, p)| {
        AffinityDeltas {
            demon_affinity: d,
            angel_affinity: a,
            corruption_value: c,
            purity_value: p,
        }
    })
}

fn arb_snapshot() -> impl Strategy<Value = ProgressionSnapshot> {
    (
        (0..200u32, 0..=100i32, 0..=100i32, 0..=100i32, 0..=100i32),
        (0..50u32, 0..50u32, 0..50u32, 0..500u32),
        prop::collection::btree_set("[a-c]_[a-c]", 0..4),
    )
        .prop_map(
            |((conversations, demon, angel, corruption, purity), (total, dc, ac, minutes), history)| {
                ProgressionSnapshot {
                    conversation_count: conversations,
                    demon_affinity: demon,
                    angel_affinity: angel,
                    corruption_value: corruption,
                    purity_value: purity,
                    total_choices: total,
                    demon_choices: dc,
                    angel_choices: ac,
                    time_played_minutes: minutes,
                    choice_history: history,
                }
            },
        )
}

fn arb_conditions() -> impl Strategy<Value = UnlockConditions> {
    (
        prop::option::of(0..100u32),
        prop::option::of(0..=100i32),
        prop::option::of(0..=100i32),
        prop::option::of(0..30u32),
        prop::option::of(prop::collection::btree_set("[a-c]_[a-c]", 1..3)),
    )
        .prop_map(|(conversations, demon, purity, total, choices)| {
            let mut set = Vec::new();
            set.extend(conversations.map(Condition::ConversationCount));
            set.extend(demon.map(Condition::DemonAffinity));
            set.extend(purity.map(Condition::PurityValue));
            set.extend(total.map(Condition::TotalChoices));
            set.extend(choices.map(Condition::SpecificChoices));
            UnlockConditions::new(set).expect("generated conditions are valid")
        })
}

fn arb_registry() -> impl Strategy<Value = FragmentRegistry> {
    prop::collection::vec((0..5usize, arb_conditions()), 1..12).prop_map(|specs| {
        let fragments = specs
            .into_iter()
            .enumerate()
            .map(|(i, (category, conditions))| FragmentDefinition {
                id: FragmentId::new(format!("frag_{i}")),
                category: FragmentCategory::ALL[category],
                order: u32::try_from(i).expect("small"),
                rarity: Rarity::Common,
                title: format!("Fragment {i}"),
                description: String::new(),
                content: String::new(),
                conditions,
            })
            .collect();
        FragmentRegistry::new(fragments).expect("unique ids and orders")
    })
}

// ---------------------------------------------------------------------------
// Property: a lone demon threshold depends on demon affinity only
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn demon_threshold_reads_only_demon_affinity(
        threshold in 0..=100i32,
        snapshot in arb_snapshot(),
    ) {
        let conditions = UnlockConditions::new([Condition::DemonAffinity(threshold)]).expect("valid");
        prop_assert_eq!(
            evaluate(&conditions, &snapshot),
            snapshot.demon_affinity >= threshold
        );
    }
}

// ---------------------------------------------------------------------------
// Property: scores stay in [0, 100] and tallies add up
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn applied_choices_stay_clamped_and_counted(
        choices in prop::collection::vec((arb_choice_type(), arb_deltas()), 0..60),
    ) {
        let tracker = AffinityTracker::default();
        let mut state = AffinityState::new();
        for (choice, deltas) in &choices {
            tracker.apply(&mut state, *choice, deltas, Utc::now()).expect("deltas within bound");
        }

        for value in [state.demon_affinity, state.angel_affinity, state.corruption_value, state.purity_value] {
            prop_assert!((0..=100).contains(&value));
        }
        prop_assert_eq!(state.total_choices as usize, choices.len());
        prop_assert_eq!(
            state.demon_choices + state.angel_choices + state.neutral_choices(),
            state.total_choices
        );
    }
}

// ---------------------------------------------------------------------------
// Property: a second pass over the same snapshot changes nothing
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn unlock_pass_is_idempotent(registry in arb_registry(), snapshot in arb_snapshot()) {
        let engine = UnlockEngine::new(Arc::new(registry));
        let mut ledger = UnlockLedger::new();
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).single().expect("valid time");

        engine.evaluate_and_unlock(&mut ledger, &snapshot, at);
        let after_first = ledger.clone();
        let second = engine.evaluate_and_unlock(&mut ledger, &snapshot, at);

        prop_assert!(second.is_empty());
        prop_assert_eq!(ledger, after_first);
    }
}

// ---------------------------------------------------------------------------
// Property: one pass returns fragments sorted by (category, order)
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn unlock_order_is_category_then_order(registry in arb_registry(), snapshot in arb_snapshot()) {
        let engine = UnlockEngine::new(Arc::new(registry));
        let mut ledger = UnlockLedger::new();
        let unlocked = engine.evaluate_and_unlock(&mut ledger, &snapshot, Utc::now());

        let keys: Vec<_> = unlocked.iter().map(|u| u.fragment.sort_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        prop_assert_eq!(keys, sorted);

        let ids: BTreeSet<_> = unlocked.iter().map(|u| u.fragment.id.clone()).collect();
        prop_assert_eq!(ids.len(), unlocked.len());
    }
}

// ---------------------------------------------------------------------------
// Property: replaying the log reproduces the incremental state
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn replay_matches_incremental(
        choices in prop::collection::vec((arb_choice_type(), arb_deltas()), 0..30),
    ) {
        use reverie_core::choice::ChoiceEvent;
        use reverie_core::types::{EventId, SessionId, UserId};

        let tracker = AffinityTracker::default();
        let user = UserId::new();
        let session = SessionId::new();
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("valid time");

        let mut state = AffinityState::new();
        let mut log = Vec::new();
        for (i, (choice, deltas)) in choices.iter().enumerate() {
            let at = start + chrono::Duration::seconds(i64::try_from(i).expect("small"));
            tracker.apply(&mut state, *choice, deltas, at).expect("deltas within bound");
            log.push(ChoiceEvent {
                event_id: EventId::new(),
                user_id: user,
                session_id: session,
                choice_id: format!("c{i}"),
                choice_type: *choice,
                content: String::new(),
                deltas: *deltas,
                occurred_at: at,
            });
        }
        log.reverse();

        prop_assert_eq!(tracker.replay(&log), state);
    }
}
