//! Sync flow tests.
//!
//! Drive a `ProgressStore` against `FakeProgressService` through whole sync
//! passes: partial failures, replays, overlapping passes and sessions that
//! end while a pass is in flight.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p trail_core --test sync_flow_tests
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use trail_core::remote::{
    AwardRequest, AwardResponse, FakeAward, FakeProgressService, LessonProgress, ProgressService,
};
use trail_core::sync::SkipReason;
use trail_core::{
    EngineConfig, LessonId, ProgressStore, RemoteError, StaticTokenProvider, UserProfile, XpTotals,
};

// ============================================================================
// Helpers
// ============================================================================

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.sync.item_delay_ms = 0;
    config.sync.interval_ms = 250;
    config
}

fn make_store(fake: &Arc<FakeProgressService>) -> ProgressStore {
    let sessions = Arc::new(StaticTokenProvider::new(Some("token-1".to_string())));
    ProgressStore::new(test_config(), fake.clone(), sessions, vec![1, 2, 3])
}

fn profile(xp: u64) -> UserProfile {
    UserProfile {
        user_id: "learner".to_string(),
        xp: Some(xp),
        level: None,
    }
}

fn pending_keys(store: &ProgressStore) -> Vec<String> {
    store
        .pending_awards()
        .into_iter()
        .map(|e| e.event_key)
        .collect()
}

/// Applies awards like the fake, but loses the reply for chosen keys once
struct LostReplyService {
    inner: FakeProgressService,
    lose_reply: Mutex<HashSet<String>>,
}

impl LostReplyService {
    fn new(keys: &[&str]) -> Self {
        Self {
            inner: FakeProgressService::new(),
            lose_reply: Mutex::new(keys.iter().map(|k| k.to_string()).collect()),
        }
    }
}

#[async_trait]
impl ProgressService for LostReplyService {
    async fn award(&self, request: &AwardRequest, token: &str) -> Result<AwardResponse, RemoteError> {
        let response = self.inner.award(request, token).await?;
        if self.lose_reply.lock().unwrap().remove(&request.event_key) {
            return Err(RemoteError::Transport("connection reset".into()));
        }
        Ok(response)
    }

    async fn all_progress(&self, token: &str) -> Result<Vec<LessonProgress>, RemoteError> {
        self.inner.all_progress(token).await
    }

    async fn complete_lesson(&self, lesson_id: LessonId, token: &str) -> Result<(), RemoteError> {
        self.inner.complete_lesson(lesson_id, token).await
    }
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test]
async fn test_transport_failure_requeues_only_failed_item() {
    let fake = Arc::new(FakeProgressService::new());
    fake.script("a", FakeAward::Fail(RemoteError::Transport("reset".into())));
    let store = make_store(&fake);
    store.start_session(&profile(0)).await;

    store.award_xp(10, "a");
    store.award_xp(20, "b");

    let first = store.sync_now().await;
    assert_eq!(first.requeued, 1);
    assert_eq!(first.confirmed, 1);
    assert_eq!(pending_keys(&store), vec!["a"]);

    // Server totals win; the requeued award shows up once confirmed
    assert_eq!(fake.server_xp(), 20);
    assert_eq!(store.totals().xp, 20);

    let second = store.sync_now().await;
    assert_eq!(second.confirmed, 1);
    assert_eq!(fake.submission_count("a"), 2);
    assert_eq!(fake.submission_count("b"), 1);
    assert_eq!(fake.server_xp(), 30);
    assert_eq!(store.totals().xp, 30);
    assert!(store.pending_awards().is_empty());
}

#[tokio::test]
async fn test_lost_reply_not_counted_twice() {
    let service = Arc::new(LostReplyService::new(&["a"]));
    let sessions = Arc::new(StaticTokenProvider::new(Some("token-1".to_string())));
    let store = ProgressStore::new(test_config(), service.clone(), sessions, vec![1]);
    store.start_session(&profile(0)).await;

    store.award_xp(10, "a");
    store.award_xp(20, "b");

    // "a" was applied server-side but its reply never arrived
    let first = store.sync_now().await;
    assert_eq!(first.requeued, 1);
    assert_eq!(first.confirmed, 1);
    assert_eq!(service.inner.server_xp(), 30);
    assert_eq!(store.totals().xp, 30);

    // The resend is a replay and leaves local totals alone
    let second = store.sync_now().await;
    assert_eq!(second.replayed, 1);
    assert_eq!(store.totals().xp, service.inner.server_xp());
    assert!(store.pending_awards().is_empty());
}

#[tokio::test]
async fn test_offline_then_recovers() {
    let fake = Arc::new(FakeProgressService::new().with_server_xp(200));
    for _ in 0..3 {
        fake.script("lesson_complete_1", FakeAward::Fail(RemoteError::Timeout(Duration::from_secs(10))));
    }
    let store = make_store(&fake);
    store.start_session(&profile(200)).await;
    store.award_xp(100, "lesson_complete_1");

    for _ in 0..3 {
        let report = store.sync_now().await;
        assert_eq!(report.requeued, 1);
        assert_eq!(store.totals().xp, 300);
    }

    store.sync_now().await;
    assert_eq!(fake.server_xp(), 300);
    assert_eq!(store.totals().xp, 300);
    assert_eq!(store.snapshot().sync.pending, 0);
}

// ============================================================================
// Server answers
// ============================================================================

#[tokio::test]
async fn test_already_awarded_leaves_xp_unchanged() {
    let fake = Arc::new(FakeProgressService::new().with_server_xp(50));
    fake.script("basic_pass_1", FakeAward::Replay(Some(XpTotals { xp: 50, level: 1 })));
    let store = make_store(&fake);
    store.start_session(&profile(50)).await;
    store.award_xp(50, "basic_pass_1");

    let report = store.sync_now().await;
    assert_eq!(report.replayed, 1);
    assert_eq!(store.totals().xp, 100);
    assert!(store.pending_awards().is_empty());
}

#[tokio::test]
async fn test_server_totals_override_local_drift() {
    let fake = Arc::new(FakeProgressService::new());
    fake.script("a", FakeAward::Totals(XpTotals { xp: 900, level: 4 }));
    let store = make_store(&fake);
    store.start_session(&profile(0)).await;
    store.award_xp(10, "a");

    store.sync_now().await;
    let totals = store.totals();
    assert_eq!(totals.xp, 900);
    assert_eq!(totals.level, 4);
}

#[tokio::test]
async fn test_auth_failure_halts_and_keeps_batch() {
    let fake = Arc::new(FakeProgressService::new());
    fake.script("a", FakeAward::Fail(RemoteError::Unauthorized));
    let store = make_store(&fake);
    store.start_session(&profile(0)).await;
    store.award_xp(10, "a");
    store.award_xp(20, "b");

    let report = store.sync_now().await;
    assert!(report.halted_by_auth);
    assert_eq!(fake.submission_count("b"), 0);
    assert_eq!(pending_keys(&store), vec!["a", "b"]);
    assert_eq!(store.totals().xp, 30);

    let report = store.sync_now().await;
    assert!(!report.halted_by_auth);
    assert_eq!(report.confirmed, 2);
    assert_eq!(fake.server_xp(), 30);
}

// ============================================================================
// Concurrency and session boundaries
// ============================================================================

#[tokio::test]
async fn test_overlapping_passes_do_not_double_submit() {
    let fake = Arc::new(FakeProgressService::new().with_award_delay(Duration::from_millis(100)));
    let store = make_store(&fake);
    store.start_session(&profile(0)).await;
    store.award_xp(10, "a");

    let (first, second) = tokio::join!(store.sync_now(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.sync_now().await
    });

    assert_eq!(first.confirmed, 1);
    assert_eq!(second.skipped, Some(SkipReason::InFlight));
    assert_eq!(fake.submission_count("a"), 1);
}

#[tokio::test]
async fn test_award_during_pass_lands_in_next_batch() {
    let fake = Arc::new(FakeProgressService::new().with_award_delay(Duration::from_millis(100)));
    let store = make_store(&fake);
    store.start_session(&profile(0)).await;
    store.award_xp(10, "a");

    let pass = tokio::spawn({
        let store = store.clone();
        async move { store.sync_now().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.award_xp(20, "b");

    let report = pass.await.unwrap();
    assert_eq!(report.submitted, 1);
    assert_eq!(pending_keys(&store), vec!["b"]);
    // Server totals win until the queued award is confirmed
    assert_eq!(store.totals().xp, 10);

    store.sync_now().await;
    assert_eq!(fake.server_xp(), 30);
    assert_eq!(store.totals().xp, 30);
}

#[tokio::test]
async fn test_cancelled_pass_returns_awards_to_queue() {
    let fake = Arc::new(FakeProgressService::new().with_award_delay(Duration::from_millis(200)));
    let store = make_store(&fake);
    store.start_session(&profile(0)).await;
    store.award_xp(10, "a");
    store.award_xp(20, "b");

    let cancelled = tokio::time::timeout(Duration::from_millis(50), store.sync_now()).await;
    assert!(cancelled.is_err());

    let snap = store.snapshot();
    assert!(!snap.sync.in_flight);
    assert_eq!(pending_keys(&store), vec!["a", "b"]);
    assert_eq!(snap.xp, 30);
    assert_eq!(fake.server_xp(), 0);

    let report = store.sync_now().await;
    assert_eq!(report.confirmed, 2);
    assert_eq!(fake.server_xp(), 30);
    assert!(store.pending_awards().is_empty());
}

#[tokio::test]
async fn test_results_for_ended_session_are_discarded() {
    let fake = Arc::new(FakeProgressService::new().with_award_delay(Duration::from_millis(100)));
    let store = make_store(&fake);
    store.start_session(&profile(0)).await;
    store.award_xp(500, "a");

    let pass = tokio::spawn({
        let store = store.clone();
        async move { store.sync_now().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.end_session();
    store.start_session(&profile(40)).await;

    let report = pass.await.unwrap();
    assert!(report.stale);

    let snap = store.snapshot();
    assert_eq!(snap.xp, 40);
    assert!(!snap.sync.in_flight);
    assert!(store.pending_awards().is_empty());
}

#[tokio::test]
async fn test_background_loop_drains_queue() {
    let fake = Arc::new(FakeProgressService::new());
    let store = make_store(&fake);
    store.start_session(&profile(0)).await;
    assert!(store.start_sync());
    assert!(!store.start_sync());

    store.award_xp(10, "a");
    store.award_xp(20, "b");
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(fake.server_xp(), 30);
    assert!(store.pending_awards().is_empty());
    assert_eq!(fake.tokens_seen().first().map(String::as_str), Some("token-1"));

    store.end_session();
    store.award_xp(10, "c");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(fake.submission_count("c"), 0);
}

#[tokio::test]
async fn test_needs_reauth_surfaces_in_snapshot() {
    let fake = Arc::new(FakeProgressService::new());
    for _ in 0..5 {
        fake.script("a", FakeAward::Fail(RemoteError::Unauthorized));
    }
    let store = make_store(&fake);
    store.start_session(&profile(0)).await;
    store.award_xp(10, "a");

    for _ in 0..3 {
        store.sync_now().await;
    }
    let status = store.snapshot().sync;
    assert!(status.needs_reauth);
    assert_eq!(status.pending, 1);
    assert_eq!(store.totals().xp, 10);
}
