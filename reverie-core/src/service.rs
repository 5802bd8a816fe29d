//! Progression service — the public entry point of the engine.
//!
//! Every operation follows the same shape: take the user's lock (for
//! mutations), load fresh state from the store, compute on a working copy,
//! persist, respond. Nothing is cached between calls, so a failed write
//! leaves no in-memory residue and the next call recomputes from the store.
//!
//! Store and session calls are bounded by `persistence.io_timeout_ms`.
//! Writes are retried with exponential backoff and jitter; a retry re-sends
//! the record that was already computed and never re-runs evaluation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::affinity::{AffinityState, AffinityTracker};
use crate::choice::{ChoiceEvent, ChoiceSubmission};
use crate::config::{PersistenceConfig, ReverieConfig};
use crate::error::{ReverieError, Result};
use crate::fragment::FragmentRegistry;
use crate::locks::UserLocks;
use crate::metrics::ProgressionCounters;
use crate::progress::ProgressReporter;
use crate::response::{AffinityResponse, ChoiceOutcome, MemoryFragmentResponse, MemoryProgressResponse};
use crate::snapshot::ProgressionSnapshot;
use crate::store::{ProgressStore, SessionStatsProvider};
use crate::types::{FragmentId, SessionId, SessionStats, UserId};
use crate::unlock::{UnlockEngine, UnlockLedger};

/// Orchestrates tracker, engine and reporter over a store and a session
/// provider.
#[derive(Debug)]
pub struct ProgressionService<S, P> {
    store: S,
    sessions: P,
    registry: Arc<FragmentRegistry>,
    tracker: AffinityTracker,
    engine: UnlockEngine,
    reporter: ProgressReporter,
    locks: UserLocks,
    counters: ProgressionCounters,
    persistence: PersistenceConfig,
}

impl<S: ProgressStore, P: SessionStatsProvider> ProgressionService<S, P> {
    /// Assemble a service over an already loaded registry.
    #[must_use]
    pub fn new(config: &ReverieConfig, registry: Arc<FragmentRegistry>, store: S, sessions: P) -> Self {
        Self {
            store,
            sessions,
            tracker: AffinityTracker::new(config.affinity.clone()),
            engine: UnlockEngine::new(Arc::clone(&registry)),
            reporter: ProgressReporter::new(Arc::clone(&registry), config.unlock.clone()),
            registry,
            locks: UserLocks::new(),
            counters: ProgressionCounters::new(),
            persistence: config.persistence.clone(),
        }
    }

    /// Assemble a service, loading the catalog named by the config.
    ///
    /// # Errors
    /// Returns `ReverieError::Catalog` or `ReverieError::Io` if the catalog
    /// cannot be loaded.
    pub fn from_config(config: &ReverieConfig, store: S, sessions: P) -> Result<Self> {
        let registry = FragmentRegistry::load(config.catalog.path.as_deref())?;
        info!(fragments = registry.len(), "Progression service ready");
        Ok(Self::new(config, Arc::new(registry), store, sessions))
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Run an unlock pass after a chat message.
    ///
    /// The session provider is expected to have counted the message already.
    /// Fragments whose record could not be saved stay locked for the next
    /// pass; the ones that were saved are still returned.
    ///
    /// # Errors
    /// `NotFound` for an unknown session, `Persistence` if the store fails
    /// and no unlock of this pass could be saved.
    pub async fn process_message(&self, user: UserId, session: SessionId) -> Result<Vec<MemoryFragmentResponse>> {
        let _guard = self.locks.lock(user).await;
        let stats = self.session_stats(user, session).await?;
        let state = self.load_state(user).await?;
        let history = self.io("load_choice_events", self.store.load_choice_events(user)).await?;
        let ledger = self.load_ledger(user).await?;

        let pass = self.unlock_pass(user, &state, &stats, &history, ledger, Utc::now()).await;
        match pass.failure {
            Some(err) if pass.saved.is_empty() => Err(err),
            _ => Ok(pass.saved),
        }
    }

    /// Validate and apply a narrative choice, then run an unlock pass.
    ///
    /// A submission whose `idempotency_key` is already in the choice log is
    /// not applied again; the stored state is reconciled with the log and
    /// the unlock pass re-runs. Once the choice is recorded, failed unlock
    /// writes no longer fail the call: those fragments are listed in
    /// [`ChoiceOutcome::deferred`] and stay locked for the next pass.
    ///
    /// # Errors
    /// `Validation` for a malformed submission (nothing is applied),
    /// `NotFound` for an unknown session, `Persistence` if the choice itself
    /// could not be recorded.
    pub async fn apply_choice(
        &self,
        user: UserId,
        session: SessionId,
        submission: ChoiceSubmission,
    ) -> Result<ChoiceOutcome> {
        let now = Utc::now();
        let event = ChoiceEvent::from_submission(user, session, submission, now)?;
        self.tracker.validate_deltas(&event.deltas)?;

        let _guard = self.locks.lock(user).await;
        let stats = self.session_stats(user, session).await?;
        let mut state = self.load_state(user).await?;
        let mut history = self.io("load_choice_events", self.store.load_choice_events(user)).await?;
        let ledger = self.load_ledger(user).await?;

        if history.iter().any(|e| e.event_id == event.event_id) {
            let replayed = self.tracker.replay(&history);
            if replayed != state {
                self.persist("save_affinity", user, || self.store.save_affinity(user, &replayed))
                    .await?;
                info!(user = %user, event = %event.event_id, "Reconciled affinity with choice log");
            }
            state = replayed;
            debug!(user = %user, event = %event.event_id, "Choice already recorded, not applied again");
        } else {
            self.tracker.apply(&mut state, event.choice_type, &event.deltas, now)?;
            self.persist("append_choice_event", user, || self.store.append_choice_event(&event))
                .await?;
            self.persist("save_affinity", user, || self.store.save_affinity(user, &state))
                .await?;
            ProgressionCounters::add(&self.counters.choices_applied, 1);
            debug!(
                user = %user,
                choice = %event.choice_id,
                choice_type = %event.choice_type,
                demon = state.demon_affinity,
                angel = state.angel_affinity,
                "Choice applied"
            );
            history.push(event);
        }

        let pass = self.unlock_pass(user, &state, &stats, &history, ledger, now).await;
        Ok(ChoiceOutcome {
            affinity: self.tracker.respond(&state),
            unlocked: pass.saved,
            deferred: pass.deferred,
        })
    }

    /// Current affinity with derived fields. Unknown users read as all-zero.
    ///
    /// # Errors
    /// `Persistence` if the store fails.
    pub async fn affinity(&self, user: UserId) -> Result<AffinityResponse> {
        let state = self.load_state(user).await?;
        Ok(self.tracker.respond(&state))
    }

    /// Full progress report, including hints computed against `session`.
    ///
    /// # Errors
    /// `NotFound` for an unknown session, `Persistence` if the store fails.
    pub async fn memory_progress(&self, user: UserId, session: SessionId) -> Result<MemoryProgressResponse> {
        let stats = self.session_stats(user, session).await?;
        let state = self.load_state(user).await?;
        let history = self.io("load_choice_events", self.store.load_choice_events(user)).await?;
        let ledger = self.load_ledger(user).await?;

        let snapshot = ProgressionSnapshot::build(&state, &stats, &history);
        Ok(self.reporter.report(&ledger, &snapshot))
    }

    /// One fragment as the user currently sees it.
    ///
    /// # Errors
    /// `NotFound` for an unknown fragment id, `Persistence` if the store fails.
    pub async fn fragment(&self, user: UserId, id: &FragmentId) -> Result<MemoryFragmentResponse> {
        let definition = self.registry.require(id)?;
        let ledger = self.load_ledger(user).await?;
        Ok(MemoryFragmentResponse::new(definition, ledger.get(id)))
    }

    /// Record that the user opened an unlocked fragment.
    ///
    /// # Errors
    /// `NotFound` for an unknown fragment id, `Validation` if it is still
    /// locked, `Persistence` if the store fails.
    pub async fn mark_viewed(&self, user: UserId, id: &FragmentId) -> Result<MemoryFragmentResponse> {
        let definition = self.registry.require(id)?;
        let _guard = self.locks.lock(user).await;
        let mut ledger = self.load_ledger(user).await?;
        if !ledger.is_unlocked(id) {
            return Err(ReverieError::Validation(format!("fragment '{id}' is still locked")));
        }

        let record = ledger.entry(id);
        record.record_view(Utc::now());
        let record = record.clone();
        self.persist("save_unlock_record", user, || self.store.save_unlock_record(user, &record))
            .await?;
        debug!(user = %user, fragment = %id, views = record.view_count, "Fragment viewed");
        Ok(MemoryFragmentResponse::new(definition, Some(&record)))
    }

    /// Rebuild the stored affinity state from the choice log.
    ///
    /// # Errors
    /// `Persistence` if the store fails.
    pub async fn rebuild_affinity(&self, user: UserId) -> Result<AffinityResponse> {
        let _guard = self.locks.lock(user).await;
        let events = self.io("load_choice_events", self.store.load_choice_events(user)).await?;
        let state = self.tracker.replay(&events);
        self.persist("save_affinity", user, || self.store.save_affinity(user, &state))
            .await?;
        info!(user = %user, events = events.len(), "Affinity rebuilt from choice log");
        Ok(self.tracker.respond(&state))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The session provider.
    #[must_use]
    pub fn sessions(&self) -> &P {
        &self.sessions
    }

    /// The fragment registry.
    #[must_use]
    pub fn registry(&self) -> &FragmentRegistry {
        &self.registry
    }

    /// Runtime counters.
    #[must_use]
    pub fn counters(&self) -> &ProgressionCounters {
        &self.counters
    }

    /// Drop lock entries for users with no request in flight.
    pub fn prune_idle_locks(&self) -> usize {
        self.locks.prune_idle()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Evaluate, then save each new unlock on its own. A failed write leaves
    /// that fragment locked and the pass moves on to the next one.
    async fn unlock_pass(
        &self,
        user: UserId,
        state: &AffinityState,
        stats: &SessionStats,
        history: &[ChoiceEvent],
        mut ledger: UnlockLedger,
        now: DateTime<Utc>,
    ) -> UnlockPass {
        let snapshot = ProgressionSnapshot::build(state, stats, history);
        let unlocked = self.engine.evaluate_and_unlock(&mut ledger, &snapshot, now);
        ProgressionCounters::add(&self.counters.evaluations, 1);

        let mut pass = UnlockPass::default();
        for fragment in &unlocked {
            let saved = self
                .persist("save_unlock_record", user, || {
                    self.store.save_unlock_record(user, &fragment.record)
                })
                .await;
            match saved {
                Ok(()) => {
                    ProgressionCounters::add(&self.counters.unlocks, 1);
                    info!(
                        user = %user,
                        fragment = %fragment.fragment.id,
                        category = %fragment.fragment.category,
                        trigger = fragment.record.trigger.as_deref().unwrap_or_default(),
                        "Memory fragment unlocked"
                    );
                    pass.saved.push(MemoryFragmentResponse::from(fragment));
                }
                Err(err) => {
                    warn!(
                        user = %user,
                        fragment = %fragment.fragment.id,
                        error = %err,
                        "Unlock not saved, fragment stays locked until the next pass"
                    );
                    pass.deferred.push(fragment.fragment.id.clone());
                    pass.failure.get_or_insert(err);
                }
            }
        }
        pass
    }

    async fn session_stats(&self, user: UserId, session: SessionId) -> Result<SessionStats> {
        let stats = self
            .io("session_stats", self.sessions.session_stats(session))
            .await?
            .filter(|s| s.user_id == user);
        stats.ok_or_else(|| ReverieError::not_found("session", session))
    }

    /// Load (or default) the user's state, clamping anything out of range.
    async fn load_state(&self, user: UserId) -> Result<AffinityState> {
        let mut state = self
            .io("load_affinity", self.store.load_affinity(user))
            .await?
            .unwrap_or_default();
        let repairs = state.repair(user);
        for repair in &repairs {
            warn!(user = %user, error = %repair, "Clamped inconsistent affinity state");
        }
        ProgressionCounters::add(&self.counters.clamp_repairs, repairs.len() as u64);
        Ok(state)
    }

    async fn load_ledger(&self, user: UserId) -> Result<UnlockLedger> {
        let records = self
            .io("load_unlock_records", self.store.load_unlock_records(user))
            .await?;
        Ok(records.into_iter().collect())
    }

    /// Bound one store or session call by the configured timeout.
    async fn io<T>(&self, operation: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.persistence.io_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ReverieError::persistence(
                operation,
                format!("timed out after {} ms", timeout.as_millis()),
            )),
        }
    }

    /// Run a write with bounded retries.
    async fn persist<F, Fut>(&self, operation: &'static str, user: UserId, mut call: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let attempts = self.persistence.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.io(operation, call()).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = backoff_delay(self.persistence.retry_backoff_ms, attempt);
                    warn!(
                        user = %user,
                        operation,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Store write failed, retrying"
                    );
                    ProgressionCounters::add(&self.counters.persistence_retries, 1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    ProgressionCounters::add(&self.counters.persistence_failures, 1);
                    error!(user = %user, operation, attempts = attempt, error = %err, "Store write failed");
                    return Err(err);
                }
            }
        }
    }
}

/// What one unlock pass made durable.
#[derive(Debug, Default)]
struct UnlockPass {
    saved: Vec<MemoryFragmentResponse>,
    deferred: Vec<FragmentId>,
    failure: Option<ReverieError>,
}

/// `base * 2^(attempt - 1)` plus up to `base / 2` of random jitter.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exponential = base_ms.saturating_mul(1_u64 << attempt.saturating_sub(1).min(16));
    let jitter = if base_ms < 2 {
        0
    } else {
        rand::thread_rng().gen_range(0..=base_ms / 2)
    };
    Duration::from_millis(exponential.saturating_add(jitter))
}
