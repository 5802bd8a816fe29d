//! Integration Tests — end-to-end progression flows.
//!
//! These drive [`ProgressionService`] through its public operations against
//! in-memory and SQLite stores: choices moving affinity, unlock passes,
//! progress reports, store failures, timeouts and concurrent writers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use reverie_core::affinity::{AffinityDeltas, AffinityState, BalanceStatus, ChoiceType, Personality};
use reverie_core::choice::{ChoiceEvent, ChoiceSubmission};
use reverie_core::config::ReverieConfig;
use reverie_core::error::{ReverieError, Result};
use reverie_core::fragment::FragmentRegistry;
use reverie_core::persistence::SqliteStore;
use reverie_core::service::ProgressionService;
use reverie_core::store::{MemorySessions, MemoryStore, ProgressStore};
use reverie_core::types::{EventId, FragmentId, SessionId, SessionStats, UserId};
use reverie_core::unlock::UnlockRecord;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const SCENARIO_CATALOG: &str = r#"
[[fragments]]
id = "f1"
category = "bond"
order = 1
title = "F1"
content = "first"
[fragments.conditions]
conversation_count = 5
demon_affinity = 50

[[fragments]]
id = "f2"
category = "purity"
order = 1
title = "F2"
content = "second"
[fragments.conditions]
angel_affinity = 50
"#;

// ---------------------------------------------------------------------------
// Test store with injectable misbehaviour
// ---------------------------------------------------------------------------

/// Wraps a [`MemoryStore`], optionally yielding on loads, delaying loads,
/// failing a number of unlock-record or affinity writes, or failing every
/// write of one fragment.
#[derive(Debug, Default)]
struct TestStore {
    inner: MemoryStore,
    yield_on_load: bool,
    load_delay: Option<Duration>,
    failing_unlock_writes: AtomicU32,
    failing_affinity_writes: AtomicU32,
    failing_fragment: Mutex<Option<FragmentId>>,
}

impl TestStore {
    fn yielding() -> Self {
        Self {
            yield_on_load: true,
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            load_delay: Some(delay),
            ..Self::default()
        }
    }

    fn failing(writes: u32) -> Self {
        Self {
            failing_unlock_writes: AtomicU32::new(writes),
            ..Self::default()
        }
    }

    fn failing_affinity(writes: u32) -> Self {
        Self {
            failing_affinity_writes: AtomicU32::new(writes),
            ..Self::default()
        }
    }

    fn failing_for(fragment: &str) -> Self {
        Self {
            failing_fragment: Mutex::new(Some(FragmentId::new(fragment))),
            ..Self::default()
        }
    }

    async fn before_load(&self) {
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.yield_on_load {
            tokio::task::yield_now().await;
        }
    }
}

impl ProgressStore for TestStore {
    async fn load_affinity(&self, user: UserId) -> Result<Option<AffinityState>> {
        self.before_load().await;
        self.inner.load_affinity(user).await
    }

    async fn save_affinity(&self, user: UserId, state: &AffinityState) -> Result<()> {
        let remaining = self.failing_affinity_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_affinity_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(ReverieError::persistence("save_affinity", "store unavailable"));
        }
        self.inner.save_affinity(user, state).await
    }

    async fn load_unlock_records(&self, user: UserId) -> Result<Vec<UnlockRecord>> {
        self.before_load().await;
        self.inner.load_unlock_records(user).await
    }

    async fn save_unlock_record(&self, user: UserId, record: &UnlockRecord) -> Result<()> {
        if self.failing_fragment.lock().as_ref() == Some(&record.fragment_id) {
            return Err(ReverieError::persistence("save_unlock_record", "fragment shard down"));
        }
        let remaining = self.failing_unlock_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_unlock_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(ReverieError::persistence("save_unlock_record", "store unavailable"));
        }
        self.inner.save_unlock_record(user, record).await
    }

    async fn append_choice_event(&self, event: &ChoiceEvent) -> Result<()> {
        self.inner.append_choice_event(event).await
    }

    async fn load_choice_events(&self, user: UserId) -> Result<Vec<ChoiceEvent>> {
        self.before_load().await;
        self.inner.load_choice_events(user).await
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Fixture<S> {
    service: Arc<ProgressionService<S, MemorySessions>>,
    user: UserId,
    session: SessionId,
}

fn fixture<S: ProgressStore>(catalog: Option<&str>, store: S, conversations: u32) -> Fixture<S> {
    init_tracing();
    let registry = match catalog {
        Some(toml) => FragmentRegistry::from_toml(toml).expect("catalog"),
        None => FragmentRegistry::builtin().expect("builtin catalog"),
    };
    let user = UserId::new();
    let session = SessionId::new();
    let sessions = MemorySessions::new();
    sessions.set(
        session,
        SessionStats {
            user_id: user,
            conversation_count: conversations,
            time_played_minutes: 0,
        },
    );
    let service = ProgressionService::new(&ReverieConfig::default(), Arc::new(registry), store, sessions);
    Fixture {
        service: Arc::new(service),
        user,
        session,
    }
}

fn choice(choice_id: &str, choice_type: &str, deltas: AffinityDeltas) -> ChoiceSubmission {
    ChoiceSubmission {
        choice_id: choice_id.to_string(),
        choice_type: choice_type.to_string(),
        content: format!("chose {choice_id}"),
        deltas,
        idempotency_key: None,
    }
}

fn keyed(submission: ChoiceSubmission, key: EventId) -> ChoiceSubmission {
    ChoiceSubmission {
        idempotency_key: Some(key),
        ..submission
    }
}

fn demon(by: i32) -> AffinityDeltas {
    AffinityDeltas {
        demon_affinity: by,
        ..AffinityDeltas::default()
    }
}

async fn seed_affinity<S: ProgressStore>(store: &S, user: UserId, demon_affinity: i32) {
    let state = AffinityState {
        demon_affinity,
        ..AffinityState::default()
    };
    store.save_affinity(user, &state).await.expect("seed");
}

// ---------------------------------------------------------------------------
// Unlock scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn message_unlocks_f1_only_and_is_idempotent() {
    let fx = fixture(Some(SCENARIO_CATALOG), MemoryStore::new(), 10);
    seed_affinity(fx.service.store(), fx.user, 60).await;

    let first = fx.service.process_message(fx.user, fx.session).await.expect("first pass");
    let ids: Vec<&str> = first.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["f1"]);
    assert_eq!(first[0].content.as_deref(), Some("first"));

    let second = fx.service.process_message(fx.user, fx.session).await.expect("second pass");
    assert!(second.is_empty());

    let f2 = fx.service.fragment(fx.user, &FragmentId::new("f2")).await.expect("f2");
    assert!(!f2.is_unlocked);
    assert_eq!(f2.content, None);
}

#[tokio::test]
async fn three_demon_choices_shape_affinity() {
    let fx = fixture(None, MemoryStore::new(), 0);
    let deltas = AffinityDeltas {
        demon_affinity: 15,
        corruption_value: 10,
        ..AffinityDeltas::default()
    };

    let mut last = None;
    for i in 0..3 {
        let outcome = fx
            .service
            .apply_choice(fx.user, fx.session, choice(&format!("tempt_{i}"), "demon", deltas))
            .await
            .expect("apply");
        last = Some(outcome.affinity);
    }

    let affinity = last.expect("three outcomes");
    assert_eq!(affinity.demon_affinity, 45);
    assert_eq!(affinity.corruption_value, 30);
    assert_eq!(affinity.total_choices, 3);
    assert_eq!(affinity.demon_choices, 3);
    assert_eq!(affinity.balance_status, BalanceStatus::DemonDominant);
    assert_eq!(affinity.next_personality_suggestion, Personality::Default);
    assert_eq!(affinity.last_choice_type, Some(ChoiceType::Demon));
}

#[tokio::test]
async fn choice_unlocks_fragment_requiring_specific_choice() {
    let fx = fixture(None, MemoryStore::new(), 0);
    seed_affinity(fx.service.store(), fx.user, 35).await;

    let outcome = fx
        .service
        .apply_choice(fx.user, fx.session, choice("accept_pact", "demon", demon(5)))
        .await
        .expect("apply");
    let ids: Vec<&str> = outcome.unlocked.iter().map(|f| f.id.as_str()).collect();

    // ember_whisper (demon >= 20) and the_offered_hand (demon >= 40 + accept_pact),
    // plus the condition-free first_light, in (category, order) order.
    assert_eq!(ids, vec!["first_light", "ember_whisper", "the_offered_hand"]);
    let trigger = outcome.unlocked[2].trigger.as_deref().expect("trigger");
    assert!(trigger.contains("chose accept_pact"), "{trigger}");
}

#[tokio::test]
async fn simultaneous_unlocks_follow_category_then_order() {
    let catalog = r#"
        [[fragments]]
        id = "p1"
        category = "purity"
        order = 1
        title = "P1"
        content = "."

        [[fragments]]
        id = "b2"
        category = "bond"
        order = 2
        title = "B2"
        content = "."

        [[fragments]]
        id = "b1"
        category = "bond"
        order = 1
        title = "B1"
        content = "."

        [[fragments]]
        id = "a7"
        category = "awakening"
        order = 7
        title = "A7"
        content = "."
    "#;
    let fx = fixture(Some(catalog), MemoryStore::new(), 1);

    let unlocked = fx.service.process_message(fx.user, fx.session).await.expect("pass");
    let ids: Vec<&str> = unlocked.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["a7", "b1", "b2", "p1"]);
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn five_of_twenty_is_twenty_five_percent() {
    let fx = fixture(None, MemoryStore::new(), 0);
    let ids: Vec<FragmentId> = fx.service.registry().iter().take(5).map(|f| f.id.clone()).collect();
    for (minutes, id) in ids.iter().enumerate() {
        let mut record = UnlockRecord::locked(id.clone());
        let minutes = i64::try_from(minutes).expect("small");
        record.unlock(Utc::now() + chrono::Duration::minutes(minutes), "seeded".to_string());
        fx.service.store().save_unlock_record(fx.user, &record).await.expect("seed");
    }

    let progress = fx.service.memory_progress(fx.user, fx.session).await.expect("progress");
    assert_eq!(progress.total_fragments, 20);
    assert_eq!(progress.unlocked_count, 5);
    assert!((progress.unlock_progress - 25.0).abs() < f64::EPSILON);
    assert_eq!(progress.recent_unlocks.len(), 5);
    assert_eq!(progress.recent_unlocks[0].id, ids[4], "newest first");
    assert_eq!(progress.next_unlock_hints.len(), 3);
}

// ---------------------------------------------------------------------------
// Validation and lookups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_choice_is_rejected_without_side_effects() {
    let fx = fixture(None, MemoryStore::new(), 0);

    let bad_type = fx
        .service
        .apply_choice(fx.user, fx.session, choice("x", "chaotic", demon(5)))
        .await;
    assert!(matches!(bad_type, Err(ReverieError::Validation(_))));

    let too_big = fx
        .service
        .apply_choice(fx.user, fx.session, choice("x", "demon", demon(101)))
        .await;
    assert!(matches!(too_big, Err(ReverieError::Validation(_))));

    let store = fx.service.store();
    assert!(store.load_affinity(fx.user).await.expect("load").is_none());
    assert!(store.load_choice_events(fx.user).await.expect("load").is_empty());
}

#[tokio::test]
async fn unknown_session_and_fragment_are_not_found() {
    let fx = fixture(None, MemoryStore::new(), 0);

    let unknown_session = fx.service.process_message(fx.user, SessionId::new()).await;
    assert!(matches!(unknown_session, Err(ReverieError::NotFound { entity: "session", .. })));

    let foreign_session = fx.service.process_message(UserId::new(), fx.session).await;
    assert!(matches!(foreign_session, Err(ReverieError::NotFound { entity: "session", .. })));

    let unknown_fragment = fx.service.fragment(fx.user, &FragmentId::new("ghost")).await;
    assert!(matches!(unknown_fragment, Err(ReverieError::NotFound { entity: "fragment", .. })));
}

#[tokio::test]
async fn viewing_requires_unlock_and_counts_views() {
    let fx = fixture(None, MemoryStore::new(), 0);
    let locked = FragmentId::new("the_fall");
    assert!(matches!(
        fx.service.mark_viewed(fx.user, &locked).await,
        Err(ReverieError::Validation(_))
    ));

    fx.service.process_message(fx.user, fx.session).await.expect("pass");
    let first_light = FragmentId::new("first_light");
    fx.service.mark_viewed(fx.user, &first_light).await.expect("view");
    let view = fx.service.mark_viewed(fx.user, &first_light).await.expect("view again");
    assert_eq!(view.view_count, 2);
    assert!(view.is_unlocked);
}

// ---------------------------------------------------------------------------
// State integrity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rebuild_from_log_matches_incremental_state() {
    let fx = fixture(None, MemoryStore::new(), 0);
    let steps = [
        ("a", "demon", demon(30)),
        ("b", "angel", AffinityDeltas { angel_affinity: 40, purity_value: 25, ..AffinityDeltas::default() }),
        ("c", "neutral", AffinityDeltas::default()),
        ("d", "demon", demon(90)),
    ];
    for (id, kind, deltas) in steps {
        fx.service
            .apply_choice(fx.user, fx.session, choice(id, kind, deltas))
            .await
            .expect("apply");
    }

    let incremental = fx.service.affinity(fx.user).await.expect("affinity");
    let rebuilt = fx.service.rebuild_affinity(fx.user).await.expect("rebuild");
    assert_eq!(incremental, rebuilt);
    assert_eq!(rebuilt.demon_affinity, 100);
    assert_eq!(rebuilt.neutral_choices, 1);
}

#[tokio::test]
async fn out_of_range_state_is_clamped_on_load() {
    let fx = fixture(None, MemoryStore::new(), 0);
    let corrupt = AffinityState {
        demon_affinity: 250,
        purity_value: -7,
        ..AffinityState::default()
    };
    fx.service.store().save_affinity(fx.user, &corrupt).await.expect("seed");

    let affinity = fx.service.affinity(fx.user).await.expect("affinity");
    assert_eq!(affinity.demon_affinity, 100);
    assert_eq!(affinity.purity_value, 0);
    assert_eq!(fx.service.counters().snapshot().clamp_repairs, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_choices_for_one_user_lose_no_updates() {
    let fx = fixture(None, TestStore::yielding(), 0);

    let mut handles = Vec::new();
    for i in 0..24 {
        let service = Arc::clone(&fx.service);
        let (user, session) = (fx.user, fx.session);
        handles.push(tokio::spawn(async move {
            service
                .apply_choice(user, session, choice(&format!("c{i}"), "demon", demon(1)))
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("apply");
    }

    let affinity = fx.service.affinity(fx.user).await.expect("affinity");
    assert_eq!(affinity.total_choices, 24);
    assert_eq!(affinity.demon_choices, 24);
    assert_eq!(affinity.demon_affinity, 24);
    let log = fx.service.store().load_choice_events(fx.user).await.expect("log");
    assert_eq!(log.len(), 24);
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failing_store_leaves_fragment_locked_until_it_recovers() {
    let fx = fixture(Some(SCENARIO_CATALOG), TestStore::failing(u32::MAX), 10);
    seed_affinity(fx.service.store(), fx.user, 60).await;

    let err = fx
        .service
        .process_message(fx.user, fx.session)
        .await
        .expect_err("store is down");
    assert!(matches!(err, ReverieError::Persistence { .. }));
    assert!(err.is_retryable());

    let f1 = FragmentId::new("f1");
    assert!(!fx.service.fragment(fx.user, &f1).await.expect("f1").is_unlocked);
    let counters = fx.service.counters().snapshot();
    assert_eq!(counters.persistence_failures, 1);
    assert_eq!(counters.persistence_retries, 2);

    fx.service.store().failing_unlock_writes.store(0, Ordering::SeqCst);
    let unlocked = fx.service.process_message(fx.user, fx.session).await.expect("recovered");
    assert_eq!(unlocked.len(), 1);
    assert!(fx.service.fragment(fx.user, &f1).await.expect("f1").is_unlocked);
}

#[tokio::test(start_paused = true)]
async fn transient_write_failure_is_retried() {
    let fx = fixture(Some(SCENARIO_CATALOG), TestStore::failing(1), 10);
    seed_affinity(fx.service.store(), fx.user, 60).await;

    let unlocked = fx.service.process_message(fx.user, fx.session).await.expect("retried");
    assert_eq!(unlocked.len(), 1);
    let counters = fx.service.counters().snapshot();
    assert_eq!(counters.persistence_retries, 1);
    assert_eq!(counters.persistence_failures, 0);
    assert_eq!(counters.unlocks, 1);
}

#[tokio::test(start_paused = true)]
async fn choice_stays_recorded_when_its_unlock_cannot_be_saved() {
    let fx = fixture(Some(SCENARIO_CATALOG), TestStore::failing(u32::MAX), 10);
    let key = EventId::new();
    let submission = keyed(choice("c1", "demon", demon(60)), key);

    let outcome = fx
        .service
        .apply_choice(fx.user, fx.session, submission.clone())
        .await
        .expect("choice is recorded even though the unlock write fails");
    assert!(outcome.unlocked.is_empty());
    assert_eq!(outcome.deferred, vec![FragmentId::new("f1")]);
    assert_eq!(outcome.affinity.total_choices, 1);
    assert_eq!(outcome.affinity.demon_affinity, 60);

    let f1 = FragmentId::new("f1");
    assert!(!fx.service.fragment(fx.user, &f1).await.expect("f1").is_unlocked);

    // Same submission again once the store is healthy: applied once, unlock delivered.
    fx.service.store().failing_unlock_writes.store(0, Ordering::SeqCst);
    let retried = fx
        .service
        .apply_choice(fx.user, fx.session, submission)
        .await
        .expect("retry");
    assert_eq!(retried.affinity.total_choices, 1);
    assert_eq!(retried.affinity.demon_affinity, 60);
    let ids: Vec<&str> = retried.unlocked.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["f1"]);
    assert!(retried.deferred.is_empty());

    let log = fx.service.store().load_choice_events(fx.user).await.expect("log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].event_id, key);
    assert_eq!(fx.service.counters().snapshot().choices_applied, 1);
}

#[tokio::test(start_paused = true)]
async fn partial_unlock_pass_returns_the_fragments_it_saved() {
    const TWO_FREE: &str = r#"
[[fragments]]
id = "a"
category = "awakening"
order = 1
title = "A"
content = "alpha"

[[fragments]]
id = "b"
category = "bond"
order = 1
title = "B"
content = "beta"
"#;
    let fx = fixture(Some(TWO_FREE), TestStore::failing_for("b"), 0);

    let unlocked = fx
        .service
        .process_message(fx.user, fx.session)
        .await
        .expect("a was saved, so the pass succeeds");
    let ids: Vec<&str> = unlocked.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["a"]);
    assert!(fx.service.fragment(fx.user, &FragmentId::new("a")).await.expect("a").is_unlocked);
    assert!(!fx.service.fragment(fx.user, &FragmentId::new("b")).await.expect("b").is_unlocked);
    let counters = fx.service.counters().snapshot();
    assert_eq!(counters.unlocks, 1);
    assert_eq!(counters.persistence_failures, 1);

    *fx.service.store().failing_fragment.lock() = None;
    let later = fx.service.process_message(fx.user, fx.session).await.expect("recovered");
    let ids: Vec<&str> = later.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["b"]);
}

#[tokio::test(start_paused = true)]
async fn retried_choice_catches_state_up_with_the_log() {
    let fx = fixture(None, TestStore::failing_affinity(3), 0);
    let key = EventId::new();
    let submission = keyed(choice("tempt", "demon", demon(15)), key);

    let err = fx
        .service
        .apply_choice(fx.user, fx.session, submission.clone())
        .await
        .expect_err("affinity save fails on every attempt");
    assert!(matches!(err, ReverieError::Persistence { ref operation, .. } if operation == "save_affinity"));
    assert_eq!(fx.service.store().load_choice_events(fx.user).await.expect("log").len(), 1);
    assert!(fx.service.store().load_affinity(fx.user).await.expect("load").is_none());

    let outcome = fx
        .service
        .apply_choice(fx.user, fx.session, submission)
        .await
        .expect("retry");
    assert_eq!(outcome.affinity.total_choices, 1);
    assert_eq!(outcome.affinity.demon_affinity, 15);
    assert_eq!(fx.service.store().load_choice_events(fx.user).await.expect("log").len(), 1);
    let stored = fx.service.store().load_affinity(fx.user).await.expect("load").expect("saved");
    assert_eq!(stored.total_choices, 1);
    assert_eq!(stored.demon_affinity, 15);
}

#[tokio::test]
async fn resubmitted_key_is_applied_once() {
    let fx = fixture(None, MemoryStore::new(), 0);
    let submission = keyed(choice("offer", "angel", AffinityDeltas {
        angel_affinity: 10,
        ..AffinityDeltas::default()
    }), EventId::new());

    for _ in 0..3 {
        fx.service
            .apply_choice(fx.user, fx.session, submission.clone())
            .await
            .expect("apply");
    }
    let affinity = fx.service.affinity(fx.user).await.expect("affinity");
    assert_eq!(affinity.total_choices, 1);
    assert_eq!(affinity.angel_affinity, 10);
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out_as_persistence_error() {
    let fx = fixture(None, TestStore::slow(Duration::from_secs(10)), 0);

    let result = fx.service.affinity(fx.user).await;
    match result {
        Err(ReverieError::Persistence { operation, reason }) => {
            assert_eq!(operation, "load_affinity");
            assert!(reason.contains("timed out"), "{reason}");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// SQLite end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sqlite_backed_service_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("reverie.db");
    let config = ReverieConfig::default();

    let (user, unlocked_before) = {
        let store = SqliteStore::open(&path, &config.persistence).expect("open");
        let fx = fixture(None, store, 3);
        fx.service
            .apply_choice(fx.user, fx.session, choice("spare_the_moth", "angel", AffinityDeltas {
                angel_affinity: 45,
                ..AffinityDeltas::default()
            }))
            .await
            .expect("apply");
        let progress = fx.service.memory_progress(fx.user, fx.session).await.expect("progress");
        (fx.user, progress.unlocked_count)
    };

    let store = SqliteStore::open(&path, &config.persistence).expect("reopen");
    assert!(store.integrity_check().expect("integrity"));
    let records = store.load_unlock_records(user).await.expect("records");
    assert_eq!(records.len(), unlocked_before);
    assert!(records.iter().any(|r| r.fragment_id.as_str() == "the_spared_moth"));
    let state = store.load_affinity(user).await.expect("load").expect("saved");
    assert_eq!(state.angel_affinity, 45);
    assert_eq!(state.angel_choices, 1);
}
