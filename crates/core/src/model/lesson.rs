use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{LessonId, UserId};
use crate::model::state::ProgressState;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum LessonCompletionError {
    #[error("completed_modules ({completed}) exceeds total_modules ({total})")]
    CompletedExceedsTotal { completed: u32, total: u32 },

    #[error("is_completed does not match the stored counts")]
    CompletionFlagMismatch,

    #[error("is_completed set without completed_at")]
    MissingCompletionTimestamp,

    #[error("percentage out of range: {0}")]
    PercentageOutOfRange(f32),
}

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// Completion percentage for a completed/total pair.
///
/// Rounded to the nearest whole percent and clamped to [0, 100]; an empty
/// unit reads as 0, never as a division error.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn completion_percentage(completed: u32, total: u32) -> f32 {
    if total == 0 {
        return 0.0;
    }
    let pct = f64::from(completed) / f64::from(total) * 100.0;
    pct.round().clamp(0.0, 100.0) as f32
}

//
// ─── LESSON COMPLETION ─────────────────────────────────────────────────────────
//

/// Per-(user, lesson) completion record, recomputed from module records.
///
/// `total_modules` is not owned state: every recompute re-reads it from the
/// catalog, so membership changes self-correct on the next recompute. A
/// completed lesson can reopen only that way; `completed_at`, once set,
/// never changes even across a reopen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonCompletion {
    user_id: UserId,
    lesson_id: LessonId,
    total_modules: u32,
    completed_modules: u32,
    completion_percentage: f32,
    video_progress_percentage: Option<f32>,
    is_completed: bool,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl LessonCompletion {
    /// Creates the zero-progress record written when a lesson is first
    /// touched (any module started, or video progress reported).
    #[must_use]
    pub fn stub(
        user_id: UserId,
        lesson_id: LessonId,
        total_modules: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            lesson_id,
            total_modules,
            completed_modules: 0,
            completion_percentage: 0.0,
            video_progress_percentage: None,
            is_completed: false,
            started_at: Some(now),
            completed_at: None,
        }
    }

    /// Applies a freshly derived recount to the record.
    ///
    /// Counts and percentage always take the new values; the completion flag
    /// follows `completed == total && total > 0`; `completed_at` is written
    /// only the first time the flag flips to true. Returns whether this call
    /// was that flip (`transitioned`), which is what directs the caller to
    /// cascade to the next level.
    ///
    /// # Errors
    ///
    /// Returns `LessonCompletionError::CompletedExceedsTotal` if the derived
    /// count is larger than the catalog total.
    pub fn apply_recount(
        &mut self,
        total_modules: u32,
        completed_modules: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, LessonCompletionError> {
        if completed_modules > total_modules {
            return Err(LessonCompletionError::CompletedExceedsTotal {
                completed: completed_modules,
                total: total_modules,
            });
        }

        let was_completed = self.is_completed;
        let now_completed = completed_modules == total_modules && total_modules > 0;

        self.total_modules = total_modules;
        self.completed_modules = completed_modules;
        self.completion_percentage = completion_percentage(completed_modules, total_modules);
        self.is_completed = now_completed;

        let transitioned = now_completed && !was_completed;
        if transitioned && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }

        Ok(transitioned)
    }

    /// Stores the externally supplied video signal, clamped to [0, 100].
    ///
    /// This value is never derived or touched by recomputes.
    pub fn set_video_progress(&mut self, percentage: f32) {
        self.video_progress_percentage = Some(percentage.clamp(0.0, 100.0));
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `LessonCompletionError` if counts, flags, or percentages are
    /// mutually inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        lesson_id: LessonId,
        total_modules: u32,
        completed_modules: u32,
        completion_percentage: f32,
        video_progress_percentage: Option<f32>,
        is_completed: bool,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, LessonCompletionError> {
        if completed_modules > total_modules {
            return Err(LessonCompletionError::CompletedExceedsTotal {
                completed: completed_modules,
                total: total_modules,
            });
        }
        if is_completed != (completed_modules == total_modules && total_modules > 0) {
            return Err(LessonCompletionError::CompletionFlagMismatch);
        }
        if is_completed && completed_at.is_none() {
            return Err(LessonCompletionError::MissingCompletionTimestamp);
        }
        if !(0.0..=100.0).contains(&completion_percentage) {
            return Err(LessonCompletionError::PercentageOutOfRange(
                completion_percentage,
            ));
        }
        if let Some(video) = video_progress_percentage {
            if !(0.0..=100.0).contains(&video) {
                return Err(LessonCompletionError::PercentageOutOfRange(video));
            }
        }

        Ok(Self {
            user_id,
            lesson_id,
            total_modules,
            completed_modules,
            completion_percentage,
            video_progress_percentage,
            is_completed,
            started_at,
            completed_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn total_modules(&self) -> u32 {
        self.total_modules
    }

    #[must_use]
    pub fn completed_modules(&self) -> u32 {
        self.completed_modules
    }

    #[must_use]
    pub fn completion_percentage(&self) -> f32 {
        self.completion_percentage
    }

    #[must_use]
    pub fn video_progress_percentage(&self) -> Option<f32> {
        self.video_progress_percentage
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn state(&self) -> ProgressState {
        ProgressState::of_record(self.is_completed)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
