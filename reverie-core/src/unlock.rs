//! Unlock engine — idempotent, ordered unlock transitions.
//!
//! One evaluation pass:
//!
//! 1. Skip every fragment the ledger already marks unlocked (before
//!    evaluating, so re-running a pass is a no-op).
//! 2. Evaluate the rest against the snapshot.
//! 3. Sort the passing set by `(category, order)`.
//! 4. For each, re-check the ledger and flip the record exactly once.
//!
//! The engine only mutates the ledger it is handed. Loading and persisting
//! records is the caller's job, which keeps this module free of I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::evaluate;
use crate::fragment::{FragmentDefinition, FragmentRegistry};
use crate::snapshot::ProgressionSnapshot;
use crate::types::FragmentId;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Per-user, per-fragment unlock state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRecord {
    /// Fragment this record belongs to.
    pub fragment_id: FragmentId,
    /// Monotonic: never returns to `false` once set.
    pub is_unlocked: bool,
    /// Set exactly once, when `is_unlocked` flips.
    pub unlocked_at: Option<DateTime<Utc>>,
    /// Human-readable reason, set at unlock time.
    pub trigger: Option<String>,
    /// First time the user opened the fragment.
    pub first_viewed_at: Option<DateTime<Utc>>,
    /// How often the user opened the fragment.
    pub view_count: u32,
}

impl UnlockRecord {
    /// A locked record for `fragment_id`.
    #[must_use]
    pub fn locked(fragment_id: FragmentId) -> Self {
        Self {
            fragment_id,
            is_unlocked: false,
            unlocked_at: None,
            trigger: None,
            first_viewed_at: None,
            view_count: 0,
        }
    }

    /// Flip to unlocked. Returns `false` (and changes nothing) if the
    /// record is already unlocked.
    pub fn unlock(&mut self, at: DateTime<Utc>, trigger: String) -> bool {
        if self.is_unlocked {
            return false;
        }
        self.is_unlocked = true;
        self.unlocked_at = Some(at);
        self.trigger = Some(trigger);
        true
    }

    /// Record that the user opened the fragment.
    pub fn record_view(&mut self, at: DateTime<Utc>) {
        if self.first_viewed_at.is_none() {
            self.first_viewed_at = Some(at);
        }
        self.view_count = self.view_count.saturating_add(1);
    }
}

/// A user's unlock records keyed by fragment. Missing entries are locked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockLedger {
    records: HashMap<FragmentId, UnlockRecord>,
}

impl UnlockLedger {
    /// Empty ledger: everything locked.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is unlocked.
    #[must_use]
    pub fn is_unlocked(&self, id: &FragmentId) -> bool {
        self.records.get(id).is_some_and(|r| r.is_unlocked)
    }

    /// The record for `id`, if one exists.
    #[must_use]
    pub fn get(&self, id: &FragmentId) -> Option<&UnlockRecord> {
        self.records.get(id)
    }

    /// The record for `id`, created locked if missing.
    pub fn entry(&mut self, id: &FragmentId) -> &mut UnlockRecord {
        self.records
            .entry(id.clone())
            .or_insert_with(|| UnlockRecord::locked(id.clone()))
    }

    /// Number of unlocked records.
    #[must_use]
    pub fn unlocked_count(&self) -> usize {
        self.records.values().filter(|r| r.is_unlocked).count()
    }

    /// All unlocked records.
    pub fn unlocked(&self) -> impl Iterator<Item = &UnlockRecord> + '_ {
        self.records.values().filter(|r| r.is_unlocked)
    }

    /// Consume the ledger into its record map.
    #[must_use]
    pub fn into_records(self) -> HashMap<FragmentId, UnlockRecord> {
        self.records
    }
}

impl From<HashMap<FragmentId, UnlockRecord>> for UnlockLedger {
    fn from(records: HashMap<FragmentId, UnlockRecord>) -> Self {
        Self { records }
    }
}

impl FromIterator<UnlockRecord> for UnlockLedger {
    fn from_iter<I: IntoIterator<Item = UnlockRecord>>(iter: I) -> Self {
        Self {
            records: iter
                .into_iter()
                .map(|r| (r.fragment_id.clone(), r))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A fragment that flipped to unlocked during one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockedFragment {
    /// The definition that unlocked.
    pub fragment: FragmentDefinition,
    /// Its record after the transition.
    pub record: UnlockRecord,
}

/// Evaluates locked fragments and applies unlock transitions.
#[derive(Debug, Clone)]
pub struct UnlockEngine {
    registry: Arc<FragmentRegistry>,
}

impl UnlockEngine {
    /// Create an engine over a shared registry.
    #[must_use]
    pub fn new(registry: Arc<FragmentRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this engine evaluates.
    #[must_use]
    pub fn registry(&self) -> &FragmentRegistry {
        &self.registry
    }

    /// Locked fragments whose conditions `snapshot` satisfies, sorted by
    /// `(category, order)`. Pure; does not touch the ledger.
    #[must_use]
    pub fn eligible(
        &self,
        ledger: &UnlockLedger,
        snapshot: &ProgressionSnapshot,
    ) -> Vec<&FragmentDefinition> {
        let mut eligible: Vec<&FragmentDefinition> = self
            .registry
            .iter()
            .filter(|f| !ledger.is_unlocked(&f.id))
            .filter(|f| evaluate(&f.conditions, snapshot))
            .collect();
        eligible.sort_by_key(|f| f.sort_key());
        eligible
    }

    /// Run one pass: unlock every eligible fragment in deterministic order.
    ///
    /// Returns the newly unlocked fragments in the order they were flipped.
    /// An unchanged snapshot against the same ledger yields an empty result.
    pub fn evaluate_and_unlock(
        &self,
        ledger: &mut UnlockLedger,
        snapshot: &ProgressionSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<UnlockedFragment> {
        let start = Instant::now();
        let eligible = self.eligible(ledger, snapshot);

        let mut unlocked = Vec::with_capacity(eligible.len());
        for fragment in eligible {
            let record = ledger.entry(&fragment.id);
            // Another pass may have flipped it since `eligible` was computed.
            if record.unlock(now, fragment.conditions.trigger_text(snapshot)) {
                unlocked.push(UnlockedFragment {
                    fragment: fragment.clone(),
                    record: record.clone(),
                });
            }
        }

        debug!(
            evaluated = self.registry.len(),
            unlocked = unlocked.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Unlock pass complete"
        );
        unlocked
    }
}
