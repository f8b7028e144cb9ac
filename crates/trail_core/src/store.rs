//! Progress Store
//!
//! The single owned state container for one learner session. Views get a
//! cloned handle and mutate only through the operations here:
//!
//! - `award_xp`: dedup, credit optimistic XP, enqueue for sync
//! - `open_lesson` / `open_next_lesson`: navigate the lesson trail
//! - `advance_stage` / `retreat_stage`: move through a lesson
//! - `submit_practice_evaluation` / `retry_practice`: practice results
//! - `acknowledge_level_up`: dismiss the one-shot notification
//!
//! None of these suspend. State sits behind a plain mutex that is never held
//! across an `.await`, so a dedup check and its XP credit cannot interleave
//! with anything else. Network work happens in the sync loop
//! (`sync.rs`) and in fire-and-forget completion writes.

use crate::config::EngineConfig;
use crate::error::{RemoteError, StageError};
use crate::events::{self, AwardEvent};
use crate::ledger::{DedupSet, LevelUp, XpLedger, XpTotals};
use crate::lesson::{LessonId, LessonStage, LessonTracker, PracticeRecord};
use crate::levels::{level_from_xp, LevelProgress, Rank};
use crate::practice::{PracticeEvaluation, PracticeKind};
use crate::queue::PendingQueue;
use crate::remote::ProgressService;
use crate::session::{Session, SessionProvider, UserProfile};
use crate::sync::{SyncHandle, SyncLoop, SyncStatus};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the store owns for the current session
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) session: Option<Session>,
    pub(crate) ledger: XpLedger,
    pub(crate) dedup: DedupSet,
    pub(crate) queue: PendingQueue,
    pub(crate) lessons: LessonTracker,
    pub(crate) sync: SyncStatus,
}

impl StoreState {
    /// Drop all session-scoped state, keeping the lesson catalog
    fn reset(&mut self) {
        self.session = None;
        self.ledger = XpLedger::new();
        self.dedup.clear();
        self.queue.clear();
        self.lessons.reset();
        self.sync = SyncStatus::default();
    }

    /// Dedup, credit, enqueue. Returns true if the award was applied.
    pub(crate) fn apply_award(&mut self, amount: u32, event_key: &str) -> bool {
        if self.session.is_none() {
            debug!("Ignoring award {} outside a session", event_key);
            return false;
        }
        if amount == 0 {
            debug!("Ignoring zero-XP award {}", event_key);
            return false;
        }
        // Claim the key before anything else touches state
        if !self.dedup.insert_new(event_key) {
            debug!("Duplicate award {} absorbed", event_key);
            return false;
        }

        self.ledger.credit(amount);
        let event = AwardEvent::new(amount, event_key);
        debug!("{}", event.format_log());
        self.queue.push(event);
        true
    }
}

/// One lesson on the trail, as the lesson list renders it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrailEntry {
    pub index: usize,
    pub lesson_id: LessonId,
    pub stage: LessonStage,
    pub unlocked: bool,
    pub completed: bool,
}

/// Read-only view of the store for rendering
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub session_active: bool,
    pub xp: u64,
    pub level: u32,
    pub rank: Rank,
    pub progress: LevelProgress,
    pub level_up: Option<LevelUp>,
    pub current_lesson: Option<LessonId>,
    pub current_stage: Option<LessonStage>,
    pub completed_lessons: Vec<LessonId>,
    pub trail: Vec<TrailEntry>,
    pub sync: SyncStatus,
}

/// Cloneable handle to the session's progress state
#[derive(Clone)]
pub struct ProgressStore {
    state: Arc<Mutex<StoreState>>,
    remote: Arc<dyn ProgressService>,
    sessions: Arc<dyn SessionProvider>,
    config: Arc<EngineConfig>,
    sync_task: Arc<Mutex<Option<SyncHandle>>>,
}

/// Non-owning handle held by the background sync loop
pub(crate) struct WeakProgressStore {
    state: Weak<Mutex<StoreState>>,
    remote: Arc<dyn ProgressService>,
    sessions: Arc<dyn SessionProvider>,
    config: Arc<EngineConfig>,
    sync_task: Weak<Mutex<Option<SyncHandle>>>,
}

impl WeakProgressStore {
    /// `None` once every `ProgressStore` handle is gone
    pub(crate) fn upgrade(&self) -> Option<ProgressStore> {
        Some(ProgressStore {
            state: self.state.upgrade()?,
            remote: self.remote.clone(),
            sessions: self.sessions.clone(),
            config: self.config.clone(),
            sync_task: self.sync_task.upgrade()?,
        })
    }
}

impl ProgressStore {
    pub fn new(
        config: EngineConfig,
        remote: Arc<dyn ProgressService>,
        sessions: Arc<dyn SessionProvider>,
        catalog: Vec<LessonId>,
    ) -> Self {
        let state = StoreState {
            lessons: LessonTracker::new(catalog),
            ..StoreState::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            remote,
            sessions,
            config: Arc::new(config),
            sync_task: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakProgressStore {
        WeakProgressStore {
            state: Arc::downgrade(&self.state),
            remote: self.remote.clone(),
            sessions: self.sessions.clone(),
            config: self.config.clone(),
            sync_task: Arc::downgrade(&self.sync_task),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn remote(&self) -> &Arc<dyn ProgressService> {
        &self.remote
    }

    pub(crate) fn auth_token(&self) -> Option<String> {
        self.sessions.auth_token()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.lock().session.as_ref().map(|s| s.id)
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start a session: rehydrate totals from the profile and seed lesson
    /// completion from the remote service. Any previous session is dropped.
    pub async fn start_session(&self, profile: &UserProfile) -> Session {
        self.stop_sync();

        let session = Session::new(&profile.user_id);
        let xp = profile.xp.unwrap_or(0);
        let totals = XpTotals {
            xp,
            level: profile.level.unwrap_or_else(|| level_from_xp(xp)),
        };

        {
            let mut state = self.lock();
            state.reset();
            state.ledger = XpLedger::from_totals(totals);
            state.session = Some(session.clone());
        }
        info!(
            "Session {} started for user '{}' (xp={}, level={})",
            session.id, session.user_id, totals.xp, totals.level
        );

        match self.fetch_completed().await {
            Ok(completed) => {
                let mut state = self.lock();
                if state.session.as_ref().map(|s| s.id) == Some(session.id) {
                    info!("Seeded {} completed lessons", completed.len());
                    state.lessons.seed_completed(completed);
                }
            }
            Err(e) => warn!("Failed to load lesson progress, starting empty: {}", e),
        }

        session
    }

    async fn fetch_completed(&self) -> Result<Vec<LessonId>, RemoteError> {
        let Some(token) = self.auth_token() else {
            debug!("No auth token; skipping progress fetch");
            return Ok(Vec::new());
        };
        let timeout = self.config.remote.effective_request_timeout();
        let progress = tokio::time::timeout(timeout, self.remote.all_progress(&token))
            .await
            .map_err(|_| RemoteError::Timeout(timeout))??;

        Ok(progress
            .into_iter()
            .filter(|p| p.completed)
            .map(|p| p.lesson_id)
            .collect())
    }

    /// End the session: stop syncing and discard queue, dedup set and
    /// lesson state. In-flight submissions finish but their results are
    /// ignored.
    pub fn end_session(&self) -> Option<Session> {
        self.stop_sync();
        let mut state = self.lock();
        let session = state.session.take();
        let discarded = state.queue.len();
        state.reset();

        if let Some(s) = &session {
            info!("Session {} ended ({} unsynced awards discarded)", s.id, discarded);
        }
        session
    }

    /// Start the background sync task for the current session
    pub fn start_sync(&self) -> bool {
        if self.session_id().is_none() {
            warn!("Not starting sync without an active session");
            return false;
        }
        let mut task = self.sync_task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().map_or(false, |h| !h.is_finished()) {
            return false;
        }
        *task = Some(SyncLoop::new(self.clone()).spawn());
        true
    }

    pub fn stop_sync(&self) {
        let handle = self
            .sync_task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    /// Run one sync pass now
    pub async fn sync_now(&self) -> crate::sync::SyncReport {
        SyncLoop::new(self.clone()).run_pass().await
    }

    // ========================================================================
    // XP
    // ========================================================================

    /// Award XP for an achievement. Duplicate keys are absorbed. Never
    /// blocks on the network and never fails.
    pub fn award_xp(&self, amount: u32, event_key: &str) -> bool {
        self.lock().apply_award(amount, event_key)
    }

    pub fn acknowledge_level_up(&self) -> Option<LevelUp> {
        self.lock().ledger.acknowledge_level_up()
    }

    pub fn totals(&self) -> XpTotals {
        self.lock().ledger.totals()
    }

    // ========================================================================
    // Lessons
    // ========================================================================

    pub fn set_catalog(&self, catalog: Vec<LessonId>) {
        self.lock().lessons.set_catalog(catalog);
    }

    pub fn is_unlocked(&self, index: usize) -> bool {
        self.lock().lessons.is_unlocked(index)
    }

    pub fn open_lesson(&self, index: usize) -> Result<LessonStage, StageError> {
        self.lock().lessons.open_lesson(index)
    }

    pub fn open_next_lesson(&self) -> Result<LessonStage, StageError> {
        self.lock().lessons.open_next_lesson()
    }

    /// Move the open lesson forward, awarding stage XP the first time the
    /// target stage is reached
    pub fn advance_stage(&self) -> Result<LessonStage, StageError> {
        let completed = {
            let mut state = self.lock();
            let step = state.lessons.advance()?;
            if step.to != LessonStage::Completed {
                let key = events::stage_key(step.lesson_id, step.to);
                state.apply_award(self.config.rewards.stage_advance, &key);
            }
            if step.completed_lesson {
                self.grant_completion(&mut state, step.lesson_id);
            }
            debug!("Lesson {}: {} -> {}", step.lesson_id, step.from, step.to);
            step.completed_lesson.then_some(step.lesson_id)
        };

        let stage = self.current_stage_or_completed();
        if let Some(lesson_id) = completed {
            self.persist_completion(lesson_id);
        }
        Ok(stage)
    }

    /// Move the open lesson back one stage. Never awards XP.
    pub fn retreat_stage(&self) -> Result<LessonStage, StageError> {
        let step = self.lock().lessons.retreat()?;
        debug!("Lesson {}: {} -> {}", step.lesson_id, step.from, step.to);
        Ok(step.to)
    }

    /// Record a graded practice attempt for the open lesson
    pub fn submit_practice_evaluation(
        &self,
        kind: PracticeKind,
        evaluation: PracticeEvaluation,
    ) -> Result<PracticeRecord, StageError> {
        let record = {
            let mut state = self.lock();
            let record = state.lessons.record_evaluation(kind, evaluation)?;
            let rewards = &self.config.rewards;
            let id = record.lesson_id;

            if record.awards.submission {
                state.apply_award(rewards.practice_submit, &events::submit_key(kind, id));
            }
            if record.awards.pass {
                state.apply_award(rewards.practice_pass, &events::pass_key(kind, id));
            }
            if record.awards.first_try {
                state.apply_award(rewards.first_try_bonus, &events::first_try_key(kind, id));
            }
            if record.completed_lesson {
                self.grant_completion(&mut state, id);
            }
            record
        };

        if record.completed_lesson {
            self.persist_completion(record.lesson_id);
        }
        Ok(record)
    }

    /// Clear the evaluation on record so the exercise can be retaken
    pub fn retry_practice(&self, kind: PracticeKind) {
        self.lock().lessons.retry(kind);
    }

    /// Grade a raw score with the configured pass threshold
    pub fn grade(&self, score: u8, feedback: &str, suggestion: &str) -> PracticeEvaluation {
        PracticeEvaluation::graded(
            score,
            self.config.practice.effective_pass_score(),
            feedback,
            suggestion,
        )
    }

    fn grant_completion(&self, state: &mut StoreState, lesson_id: LessonId) {
        info!("Lesson {} completed", lesson_id);
        state.apply_award(
            self.config.rewards.lesson_complete,
            &events::lesson_complete_key(lesson_id),
        );
    }

    fn current_stage_or_completed(&self) -> LessonStage {
        self.lock()
            .lessons
            .current_stage()
            .unwrap_or(LessonStage::Completed)
    }

    /// Fire-and-forget write of a completion. Failures are logged only; the
    /// server's own progress endpoint is the source of truth on next load.
    fn persist_completion(&self, lesson_id: LessonId) {
        let Some(token) = self.auth_token() else {
            warn!("No auth token; lesson {} completion not persisted", lesson_id);
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; lesson {} completion not persisted", lesson_id);
            return;
        };

        let remote = Arc::clone(&self.remote);
        let timeout = self.config.remote.effective_request_timeout();
        runtime.spawn(async move {
            match tokio::time::timeout(timeout, remote.complete_lesson(lesson_id, &token)).await {
                Ok(Ok(())) => debug!("Persisted completion of lesson {}", lesson_id),
                Ok(Err(e)) => warn!("Failed to persist completion of lesson {}: {}", lesson_id, e),
                Err(_) => warn!(
                    "Timed out persisting completion of lesson {} after {:?}",
                    lesson_id, timeout
                ),
            }
        });
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.lock();
        let totals = state.ledger.totals();
        let lessons = &state.lessons;

        let trail = lessons
            .catalog()
            .iter()
            .enumerate()
            .map(|(index, &lesson_id)| TrailEntry {
                index,
                lesson_id,
                stage: lessons.stage_of(lesson_id),
                unlocked: lessons.is_unlocked(index),
                completed: lessons.is_completed(lesson_id),
            })
            .collect();

        let mut sync = state.sync.clone();
        sync.pending = state.queue.len();

        ProgressSnapshot {
            session_active: state.session.is_some(),
            xp: totals.xp,
            level: totals.level,
            rank: Rank::from_level(totals.level),
            progress: state.ledger.progress(),
            level_up: state.ledger.pending_level_up().cloned(),
            current_lesson: lessons.current_lesson(),
            current_stage: lessons.current_stage(),
            completed_lessons: lessons.completed().iter().copied().collect(),
            trail,
            sync,
        }
    }

    pub fn pending_awards(&self) -> Vec<AwardEvent> {
        self.lock().queue.iter().cloned().collect()
    }
}
