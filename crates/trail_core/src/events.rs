//! Award events and their deterministic keys.
//!
//! Every XP-granting achievement is identified by an event key built from
//! its semantic context, so the same logical achievement always maps to the
//! same key no matter how many times the UI reports it.
//!
//! | Key                              | Granted for                          |
//! |----------------------------------|--------------------------------------|
//! | `stage_<lesson>_<stage>`         | Advancing into a lesson stage        |
//! | `basic_submit_<lesson>`          | First basic practice submission      |
//! | `basic_pass_<lesson>`            | First passing basic evaluation       |
//! | `basic_first_try_<lesson>`       | Passing basic practice on attempt 1  |
//! | `personalized_submit_<lesson>`   | First personalized submission        |
//! | `personalized_pass_<lesson>`     | First passing personalized attempt   |
//! | `personalized_first_try_<lesson>`| Passing personalized on attempt 1    |
//! | `lesson_complete_<lesson>`       | Completing the lesson                |

use crate::lesson::{LessonId, LessonStage};
use crate::practice::PracticeKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single XP award waiting to be confirmed by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardEvent {
    pub amount: u32,
    pub event_key: String,
    pub timestamp: DateTime<Utc>,
}

impl AwardEvent {
    pub fn new(amount: u32, event_key: impl Into<String>) -> Self {
        Self {
            amount,
            event_key: event_key.into(),
            timestamp: Utc::now(),
        }
    }

    /// Format as log line
    pub fn format_log(&self) -> String {
        format!(
            "XP_AWARD key={} xp=+{} at={}",
            self.event_key,
            self.amount,
            self.timestamp.to_rfc3339()
        )
    }
}

/// Key for advancing a lesson into `stage`
pub fn stage_key(lesson_id: LessonId, stage: LessonStage) -> String {
    format!("stage_{}_{}", lesson_id, stage.as_str())
}

pub fn submit_key(kind: PracticeKind, lesson_id: LessonId) -> String {
    format!("{}_submit_{}", kind.as_str(), lesson_id)
}

pub fn pass_key(kind: PracticeKind, lesson_id: LessonId) -> String {
    format!("{}_pass_{}", kind.as_str(), lesson_id)
}

pub fn first_try_key(kind: PracticeKind, lesson_id: LessonId) -> String {
    format!("{}_first_try_{}", kind.as_str(), lesson_id)
}

pub fn lesson_complete_key(lesson_id: LessonId) -> String {
    format!("lesson_complete_{}", lesson_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic() {
        assert_eq!(stage_key(3, LessonStage::BasicPractice), "stage_3_basicPractice");
        assert_eq!(stage_key(3, LessonStage::BasicPractice), stage_key(3, LessonStage::BasicPractice));
        assert_eq!(submit_key(PracticeKind::Basic, 7), "basic_submit_7");
        assert_eq!(pass_key(PracticeKind::Personalized, 7), "personalized_pass_7");
        assert_eq!(first_try_key(PracticeKind::Basic, 2), "basic_first_try_2");
        assert_eq!(lesson_complete_key(1), "lesson_complete_1");
    }

    #[test]
    fn test_keys_differ_per_lesson() {
        assert_ne!(lesson_complete_key(1), lesson_complete_key(2));
        assert_ne!(stage_key(1, LessonStage::Why), stage_key(2, LessonStage::Why));
    }

    #[test]
    fn test_award_event_serializes_camel_case() {
        let event = AwardEvent::new(10, "stage_1_why");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventKey"], "stage_1_why");
        assert_eq!(json["amount"], 10);
        assert!(event.format_log().contains("xp=+10"));
    }
}
