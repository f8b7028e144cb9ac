//! Lesson Progress Tracker
//!
//! Each lesson walks a fixed pedagogical sequence:
//!
//! ```text
//! what -> why -> formula -> comparison -> basicPractice -> personalizedPractice -> completed
//! ```
//!
//! - Forward moves past `basicPractice` need a passing basic evaluation.
//! - `personalizedPractice -> completed` needs a passing personalized
//!   evaluation; reaching it adds the lesson to the completion set.
//! - Backward moves are allowed from `why` through `personalizedPractice`.
//! - Lesson `i > 0` is unlocked only once lesson `i - 1` is completed.
//!
//! The tracker only moves state. XP for a move is decided by the store.

use crate::error::StageError;
use crate::practice::{PracticeAwards, PracticeEvaluation, PracticeKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub type LessonId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LessonStage {
    What,
    Why,
    Formula,
    Comparison,
    BasicPractice,
    PersonalizedPractice,
    Completed,
}

impl LessonStage {
    pub const ALL: [LessonStage; 7] = [
        LessonStage::What,
        LessonStage::Why,
        LessonStage::Formula,
        LessonStage::Comparison,
        LessonStage::BasicPractice,
        LessonStage::PersonalizedPractice,
        LessonStage::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStage::What => "what",
            LessonStage::Why => "why",
            LessonStage::Formula => "formula",
            LessonStage::Comparison => "comparison",
            LessonStage::BasicPractice => "basicPractice",
            LessonStage::PersonalizedPractice => "personalizedPractice",
            LessonStage::Completed => "completed",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LessonStage::Completed)
    }

    /// Following stage in the sequence
    pub fn next(&self) -> Option<LessonStage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Preceding stage, only for `why` through `personalizedPractice`
    pub fn prev(&self) -> Option<LessonStage> {
        match self {
            LessonStage::What | LessonStage::Completed => None,
            _ => Some(Self::ALL[self.index() - 1]),
        }
    }
}

impl std::fmt::Display for LessonStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl PracticeKind {
    /// Stage the exercise is taken in
    pub fn stage(&self) -> LessonStage {
        match self {
            PracticeKind::Basic => LessonStage::BasicPractice,
            PracticeKind::Personalized => LessonStage::PersonalizedPractice,
        }
    }
}

/// A stage change that happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageMove {
    pub lesson_id: LessonId,
    pub from: LessonStage,
    pub to: LessonStage,
    /// The move added the lesson to the completion set
    pub completed_lesson: bool,
}

/// A recorded practice evaluation and what it earned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeRecord {
    pub lesson_id: LessonId,
    pub kind: PracticeKind,
    pub awards: PracticeAwards,
    pub completed_lesson: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LessonTracker {
    catalog: Vec<LessonId>,
    completed: BTreeSet<LessonId>,
    stages: HashMap<LessonId, LessonStage>,
    current: Option<usize>,
    evaluations: HashMap<PracticeKind, PracticeEvaluation>,
}

impl LessonTracker {
    pub fn new(catalog: Vec<LessonId>) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    pub fn set_catalog(&mut self, catalog: Vec<LessonId>) {
        if self.current_lesson().map_or(false, |id| !catalog.contains(&id)) {
            self.current = None;
            self.evaluations.clear();
        }
        self.current = self
            .current_lesson()
            .and_then(|id| catalog.iter().position(|&c| c == id));
        self.catalog = catalog;
    }

    /// Seed the completion set from the remote service
    pub fn seed_completed(&mut self, ids: impl IntoIterator<Item = LessonId>) {
        for id in ids {
            self.completed.insert(id);
            self.stages.insert(id, LessonStage::Completed);
        }
    }

    pub fn catalog(&self) -> &[LessonId] {
        &self.catalog
    }

    pub fn completed(&self) -> &BTreeSet<LessonId> {
        &self.completed
    }

    pub fn is_completed(&self, lesson_id: LessonId) -> bool {
        self.completed.contains(&lesson_id)
    }

    /// Lesson at `index` may be opened
    pub fn is_unlocked(&self, index: usize) -> bool {
        if index >= self.catalog.len() {
            return false;
        }
        index == 0 || self.completed.contains(&self.catalog[index - 1])
    }

    /// Stage a lesson would open at
    pub fn stage_of(&self, lesson_id: LessonId) -> LessonStage {
        if self.completed.contains(&lesson_id) {
            return LessonStage::Completed;
        }
        self.stages
            .get(&lesson_id)
            .copied()
            .unwrap_or(LessonStage::What)
    }

    pub fn stages(&self) -> &HashMap<LessonId, LessonStage> {
        &self.stages
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_lesson(&self) -> Option<LessonId> {
        self.current.and_then(|i| self.catalog.get(i).copied())
    }

    pub fn current_stage(&self) -> Option<LessonStage> {
        self.current_lesson().map(|id| self.stage_of(id))
    }

    pub fn evaluation(&self, kind: PracticeKind) -> Option<&PracticeEvaluation> {
        self.evaluations.get(&kind)
    }

    fn practice_passed(&self, kind: PracticeKind) -> bool {
        self.evaluations.get(&kind).map_or(false, |e| e.is_complete)
    }

    /// Open the lesson at `index`, restoring its stage
    pub fn open_lesson(&mut self, index: usize) -> Result<LessonStage, StageError> {
        let lesson_id = *self
            .catalog
            .get(index)
            .ok_or(StageError::UnknownLesson { index })?;
        if !self.is_unlocked(index) {
            return Err(StageError::LessonLocked { index });
        }

        if self.current != Some(index) {
            self.evaluations.clear();
        }
        self.current = Some(index);
        Ok(self.stage_of(lesson_id))
    }

    pub fn open_next_lesson(&mut self) -> Result<LessonStage, StageError> {
        let index = self.current.ok_or(StageError::NoLessonOpen)?;
        if index + 1 >= self.catalog.len() {
            return Err(StageError::NoNextLesson { index });
        }
        self.open_lesson(index + 1)
    }

    fn current_or_err(&self) -> Result<LessonId, StageError> {
        self.current_lesson().ok_or(StageError::NoLessonOpen)
    }

    /// Move the open lesson one stage forward
    pub fn advance(&mut self) -> Result<StageMove, StageError> {
        let lesson_id = self.current_or_err()?;
        let from = self.stage_of(lesson_id);

        match from {
            LessonStage::Completed => return Err(StageError::Terminal(lesson_id)),
            LessonStage::BasicPractice if !self.practice_passed(PracticeKind::Basic) => {
                return Err(StageError::PracticeNotPassed(PracticeKind::Basic));
            }
            LessonStage::PersonalizedPractice => {
                if !self.practice_passed(PracticeKind::Personalized) {
                    return Err(StageError::PracticeNotPassed(PracticeKind::Personalized));
                }
                let completed_lesson = self.complete(lesson_id);
                return Ok(StageMove {
                    lesson_id,
                    from,
                    to: LessonStage::Completed,
                    completed_lesson,
                });
            }
            _ => {}
        }

        let to = from.next().ok_or(StageError::Terminal(lesson_id))?;
        self.stages.insert(lesson_id, to);
        Ok(StageMove {
            lesson_id,
            from,
            to,
            completed_lesson: false,
        })
    }

    /// Move the open lesson one stage back
    pub fn retreat(&mut self) -> Result<StageMove, StageError> {
        let lesson_id = self.current_or_err()?;
        let from = self.stage_of(lesson_id);
        let to = match from {
            LessonStage::Completed => return Err(StageError::Terminal(lesson_id)),
            LessonStage::What => return Err(StageError::AtFirstStage),
            _ => from.prev().ok_or(StageError::AtFirstStage)?,
        };

        self.stages.insert(lesson_id, to);
        Ok(StageMove {
            lesson_id,
            from,
            to,
            completed_lesson: false,
        })
    }

    /// Record an evaluation for the open lesson. A passing personalized
    /// evaluation completes the lesson.
    pub fn record_evaluation(
        &mut self,
        kind: PracticeKind,
        evaluation: PracticeEvaluation,
    ) -> Result<PracticeRecord, StageError> {
        let lesson_id = self.current_or_err()?;
        let actual = self.stage_of(lesson_id);
        if actual != kind.stage() {
            return Err(StageError::WrongStage {
                expected: kind.stage(),
                actual,
            });
        }

        let awards = PracticeAwards::earned(self.evaluations.get(&kind), &evaluation);
        let passed = evaluation.is_complete;
        self.evaluations.insert(kind, evaluation);

        let completed_lesson = kind == PracticeKind::Personalized && passed && self.complete(lesson_id);

        Ok(PracticeRecord {
            lesson_id,
            kind,
            awards,
            completed_lesson,
        })
    }

    /// Discard the evaluation on record so the exercise can be retaken
    pub fn retry(&mut self, kind: PracticeKind) -> Option<PracticeEvaluation> {
        self.evaluations.remove(&kind)
    }

    /// Mark a lesson completed. Returns true the first time.
    pub fn complete(&mut self, lesson_id: LessonId) -> bool {
        self.stages.insert(lesson_id, LessonStage::Completed);
        self.completed.insert(lesson_id)
    }

    /// Forget everything except the catalog
    pub fn reset(&mut self) {
        self.completed.clear();
        self.stages.clear();
        self.current = None;
        self.evaluations.clear();
    }
}
