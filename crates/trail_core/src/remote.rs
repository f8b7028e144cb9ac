//! Remote Progress Service Trait
//!
//! The engine talks to the backend only through `ProgressService`:
//! - award XP by event key (idempotent per key on the server)
//! - fetch lesson completion for the signed-in user
//! - mark a lesson completed
//!
//! Production code uses `HttpProgressService` (see `http.rs`). Tests use
//! `FakeProgressService`, which keeps its own server-side XP total and can be
//! scripted to fail per event key.

use crate::error::RemoteError;
use crate::ledger::XpTotals;
use crate::lesson::LessonId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRequest {
    pub amount: u32,
    pub event_key: String,
}

/// Server answer to an award
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardResponse {
    pub accepted: bool,
    /// Key had already been applied server-side
    pub already_awarded: bool,
    /// Authoritative totals after the award, when the server sends them
    pub totals: Option<XpTotals>,
}

impl AwardResponse {
    pub fn applied(totals: XpTotals) -> Self {
        Self {
            accepted: true,
            already_awarded: false,
            totals: Some(totals),
        }
    }

    pub fn replayed(totals: Option<XpTotals>) -> Self {
        Self {
            accepted: true,
            already_awarded: true,
            totals,
        }
    }
}

/// Completion state of one lesson on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub lesson_id: LessonId,
    #[serde(default)]
    pub completed: bool,
}

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait ProgressService: Send + Sync {
    /// Submit one award
    async fn award(&self, request: &AwardRequest, token: &str) -> Result<AwardResponse, RemoteError>;

    /// Fetch progress for every lesson the user has touched
    async fn all_progress(&self, token: &str) -> Result<Vec<LessonProgress>, RemoteError>;

    /// Mark a lesson completed
    async fn complete_lesson(&self, lesson_id: LessonId, token: &str) -> Result<(), RemoteError>;
}

// ============================================================================
// Fake Progress Service (Testing)
// ============================================================================

/// A scripted answer for one award submission
#[derive(Debug, Clone)]
pub enum FakeAward {
    /// Apply normally against the fake's own totals
    Apply,
    /// Claim the key was already applied, optionally with stale totals
    Replay(Option<XpTotals>),
    /// Answer with these totals as if newly applied
    Totals(XpTotals),
    /// Fail with this error
    Fail(RemoteError),
}

#[derive(Debug, Default)]
struct FakeState {
    server_xp: u64,
    applied: HashSet<String>,
    scripts: HashMap<String, VecDeque<FakeAward>>,
    submissions: Vec<String>,
    progress: Vec<LessonProgress>,
    progress_error: Option<RemoteError>,
    completions: Vec<LessonId>,
    completion_error: Option<RemoteError>,
    tokens_seen: Vec<String>,
}

/// In-memory `ProgressService` for deterministic tests
pub struct FakeProgressService {
    state: Mutex<FakeState>,
    award_delay: Duration,
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeProgressService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            award_delay: Duration::ZERO,
        }
    }

    /// Start the server-side total somewhere other than zero
    pub fn with_server_xp(self, xp: u64) -> Self {
        lock(&self.state).server_xp = xp;
        self
    }

    /// Seed server-side lesson progress
    pub fn with_progress(self, progress: Vec<LessonProgress>) -> Self {
        lock(&self.state).progress = progress;
        self
    }

    /// Slow every award down, for overlap tests
    pub fn with_award_delay(mut self, delay: Duration) -> Self {
        self.award_delay = delay;
        self
    }

    /// Queue a scripted answer for the next submission of `event_key`.
    /// Unscripted submissions use `FakeAward::Apply`.
    pub fn script(&self, event_key: &str, answer: FakeAward) {
        lock(&self.state)
            .scripts
            .entry(event_key.to_string())
            .or_default()
            .push_back(answer);
    }

    pub fn fail_progress(&self, error: RemoteError) {
        lock(&self.state).progress_error = Some(error);
    }

    pub fn fail_completions(&self, error: RemoteError) {
        lock(&self.state).completion_error = Some(error);
    }

    /// Event keys in submission order, including failed ones
    pub fn submissions(&self) -> Vec<String> {
        lock(&self.state).submissions.clone()
    }

    pub fn submission_count(&self, event_key: &str) -> usize {
        lock(&self.state)
            .submissions
            .iter()
            .filter(|k| k.as_str() == event_key)
            .count()
    }

    pub fn server_xp(&self) -> u64 {
        lock(&self.state).server_xp
    }

    pub fn completions(&self) -> Vec<LessonId> {
        lock(&self.state).completions.clone()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        lock(&self.state).tokens_seen.clone()
    }

    fn apply(state: &mut FakeState, request: &AwardRequest) -> AwardResponse {
        if !state.applied.insert(request.event_key.clone()) {
            return AwardResponse::replayed(Some(XpTotals::from_xp(state.server_xp)));
        }
        state.server_xp += u64::from(request.amount);
        AwardResponse::applied(XpTotals::from_xp(state.server_xp))
    }
}

impl Default for FakeProgressService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressService for FakeProgressService {
    async fn award(&self, request: &AwardRequest, token: &str) -> Result<AwardResponse, RemoteError> {
        if !self.award_delay.is_zero() {
            tokio::time::sleep(self.award_delay).await;
        }

        let mut state = lock(&self.state);
        state.submissions.push(request.event_key.clone());
        state.tokens_seen.push(token.to_string());

        let answer = state
            .scripts
            .get_mut(&request.event_key)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(FakeAward::Apply);

        match answer {
            FakeAward::Apply => Ok(Self::apply(&mut state, request)),
            FakeAward::Replay(totals) => Ok(AwardResponse::replayed(totals)),
            FakeAward::Totals(totals) => {
                state.applied.insert(request.event_key.clone());
                state.server_xp = totals.xp;
                Ok(AwardResponse::applied(totals))
            }
            FakeAward::Fail(error) => Err(error),
        }
    }

    async fn all_progress(&self, token: &str) -> Result<Vec<LessonProgress>, RemoteError> {
        let mut state = lock(&self.state);
        state.tokens_seen.push(token.to_string());
        match &state.progress_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.progress.clone()),
        }
    }

    async fn complete_lesson(&self, lesson_id: LessonId, token: &str) -> Result<(), RemoteError> {
        let mut state = lock(&self.state);
        state.tokens_seen.push(token.to_string());
        if let Some(error) = &state.completion_error {
            return Err(error.clone());
        }
        state.completions.push(lesson_id);
        Ok(())
    }
}
