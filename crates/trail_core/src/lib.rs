//! Trail Core - client-side XP and lesson progress engine
//!
//! Awards are credited optimistically, deduplicated by event key, queued,
//! and drained to the learning backend by a background sync loop that
//! reconciles local totals with the server.

pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod ledger;
pub mod lesson;
pub mod levels;
pub mod logging;
pub mod practice;
pub mod queue;
pub mod remote;
pub mod session;
pub mod store;
pub mod sync;

pub use config::EngineConfig;
pub use error::{FailureClass, RemoteError, StageError};
pub use events::AwardEvent;
pub use http::HttpProgressService;
pub use ledger::{LevelUp, XpTotals};
pub use lesson::{LessonId, LessonStage};
pub use levels::{level_from_xp, rank_from_level, LevelProgress, Rank};
pub use practice::{PracticeEvaluation, PracticeKind};
pub use remote::{FakeAward, FakeProgressService, ProgressService};
pub use session::{SessionProvider, StaticTokenProvider, UserProfile};
pub use store::{ProgressSnapshot, ProgressStore, TrailEntry};
pub use sync::{SyncReport, SyncStatus};
