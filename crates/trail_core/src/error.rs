//! Error types for the progress engine.

use crate::lesson::{LessonId, LessonStage};
use crate::practice::PracticeKind;
use std::time::Duration;
use thiserror::Error;

/// A refused lesson navigation. Refusals never change state or award XP.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("No lesson is open")]
    NoLessonOpen,

    #[error("Lesson index {index} is out of range")]
    UnknownLesson { index: usize },

    #[error("Lesson at index {index} is locked until the previous lesson is completed")]
    LessonLocked { index: usize },

    #[error("Already at the first stage")]
    AtFirstStage,

    #[error("Lesson {0} is already completed")]
    Terminal(LessonId),

    #[error("The {0} practice has not been passed yet")]
    PracticeNotPassed(PracticeKind),

    #[error("Practice can only be submitted from the {expected} stage (current: {actual})")]
    WrongStage {
        expected: LessonStage,
        actual: LessonStage,
    },

    #[error("No further lesson after index {index}")]
    NoNextLesson { index: usize },
}

/// How a failed remote submission is handled by the sync loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Requeue this item and stop the batch
    Authorization,
    /// Drop the item permanently
    Rejected,
    /// Requeue this item and keep going
    Transient,
}

/// Remote service errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Session is not authorized")]
    Unauthorized,

    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn class(&self) -> FailureClass {
        match self {
            RemoteError::Unauthorized => FailureClass::Authorization,
            RemoteError::Rejected { .. } | RemoteError::Decode(_) => FailureClass::Rejected,
            RemoteError::Transport(_) | RemoteError::Timeout(_) => FailureClass::Transient,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured duration
            RemoteError::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            if status.as_u16() == 401 {
                RemoteError::Unauthorized
            } else {
                RemoteError::Rejected {
                    status: status.as_u16(),
                    message: err.to_string(),
                }
            }
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classes() {
        assert_eq!(RemoteError::Unauthorized.class(), FailureClass::Authorization);
        assert_eq!(
            RemoteError::Rejected {
                status: 422,
                message: "bad amount".into()
            }
            .class(),
            FailureClass::Rejected
        );
        assert_eq!(RemoteError::Decode("eof".into()).class(), FailureClass::Rejected);
        assert_eq!(RemoteError::Transport("reset".into()).class(), FailureClass::Transient);
        assert_eq!(
            RemoteError::Timeout(Duration::from_secs(10)).class(),
            FailureClass::Transient
        );
    }

    #[test]
    fn test_stage_error_messages() {
        assert_eq!(
            StageError::PracticeNotPassed(PracticeKind::Basic).to_string(),
            "The basic practice has not been passed yet"
        );
        assert_eq!(
            StageError::LessonLocked { index: 2 }.to_string(),
            "Lesson at index 2 is locked until the previous lesson is completed"
        );
    }
}
