//! Practice evaluations and the XP they unlock.

use serde::{Deserialize, Serialize};

/// Default passing score
pub const DEFAULT_PASS_SCORE: u8 = 80;

/// Which practice exercise an evaluation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PracticeKind {
    Basic,
    Personalized,
}

impl PracticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PracticeKind::Basic => "basic",
            PracticeKind::Personalized => "personalized",
        }
    }
}

impl std::fmt::Display for PracticeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of grading one practice attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeEvaluation {
    /// Score (0-100)
    pub score: u8,
    pub is_complete: bool,
    pub feedback: String,
    pub suggestion: String,
}

impl PracticeEvaluation {
    /// Build an evaluation, deriving `is_complete` from the pass score
    pub fn graded(score: u8, pass_score: u8, feedback: &str, suggestion: &str) -> Self {
        let score = score.min(100);
        Self {
            score,
            is_complete: score >= pass_score,
            feedback: feedback.to_string(),
            suggestion: suggestion.to_string(),
        }
    }

    pub fn passed(&self) -> bool {
        self.is_complete
    }
}

/// Which practice awards a new evaluation earns, given the one on record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PracticeAwards {
    pub submission: bool,
    pub pass: bool,
    pub first_try: bool,
}

impl PracticeAwards {
    /// - submission: nothing on record yet
    /// - pass: new result passes and the previous one did not
    /// - first try: passes with nothing on record
    pub fn earned(previous: Option<&PracticeEvaluation>, current: &PracticeEvaluation) -> Self {
        let first_attempt = previous.is_none();
        let previously_passed = previous.map_or(false, |p| p.is_complete);
        let pass = current.is_complete && !previously_passed;

        Self {
            submission: first_attempt,
            pass,
            first_try: pass && first_attempt,
        }
    }

    pub fn any(&self) -> bool {
        self.submission || self.pass || self.first_try
    }
}
