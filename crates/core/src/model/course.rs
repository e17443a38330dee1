use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{CourseId, UserId};
use crate::model::lesson::completion_percentage;
use crate::model::state::ProgressState;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum CourseProgressError {
    #[error("completed_lessons ({completed}) exceeds total_lessons ({total})")]
    CompletedExceedsTotal { completed: u32, total: u32 },

    #[error("is_completed does not match the stored counts")]
    CompletionFlagMismatch,

    #[error("is_completed set without completed_at")]
    MissingCompletionTimestamp,

    #[error("percentage out of range: {0}")]
    PercentageOutOfRange(f32),
}

//
// ─── COURSE PROGRESS ───────────────────────────────────────────────────────────
//

/// Per-(user, course) progress record, recomputed from lesson records.
///
/// Unlike the two lower levels this record is created eagerly at enrollment
/// time, so a freshly enrolled user reads as 0% rather than not-found.
/// `enrolled_at` is supplied by the enrollment collaborator and never
/// changes; the completion mechanics are the same monotonic rules as for
/// lessons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseProgress {
    user_id: UserId,
    course_id: CourseId,
    total_lessons: u32,
    completed_lessons: u32,
    progress_percentage: f32,
    enrolled_at: DateTime<Utc>,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl CourseProgress {
    /// Creates the zero-progress record written at enrollment.
    #[must_use]
    pub fn enroll(
        user_id: UserId,
        course_id: CourseId,
        total_lessons: u32,
        enrolled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            course_id,
            total_lessons,
            completed_lessons: 0,
            progress_percentage: 0.0,
            enrolled_at,
            is_completed: false,
            completed_at: None,
        }
    }

    /// Applies a freshly derived recount; same rules as the lesson level.
    ///
    /// # Errors
    ///
    /// Returns `CourseProgressError::CompletedExceedsTotal` if the derived
    /// count is larger than the catalog total.
    pub fn apply_recount(
        &mut self,
        total_lessons: u32,
        completed_lessons: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, CourseProgressError> {
        if completed_lessons > total_lessons {
            return Err(CourseProgressError::CompletedExceedsTotal {
                completed: completed_lessons,
                total: total_lessons,
            });
        }

        let was_completed = self.is_completed;
        let now_completed = completed_lessons == total_lessons && total_lessons > 0;

        self.total_lessons = total_lessons;
        self.completed_lessons = completed_lessons;
        self.progress_percentage = completion_percentage(completed_lessons, total_lessons);
        self.is_completed = now_completed;

        let transitioned = now_completed && !was_completed;
        if transitioned && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }

        Ok(transitioned)
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `CourseProgressError` if counts, flags, or percentages are
    /// mutually inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        course_id: CourseId,
        total_lessons: u32,
        completed_lessons: u32,
        progress_percentage: f32,
        enrolled_at: DateTime<Utc>,
        is_completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, CourseProgressError> {
        if completed_lessons > total_lessons {
            return Err(CourseProgressError::CompletedExceedsTotal {
                completed: completed_lessons,
                total: total_lessons,
            });
        }
        if is_completed != (completed_lessons == total_lessons && total_lessons > 0) {
            return Err(CourseProgressError::CompletionFlagMismatch);
        }
        if is_completed && completed_at.is_none() {
            return Err(CourseProgressError::MissingCompletionTimestamp);
        }
        if !(0.0..=100.0).contains(&progress_percentage) {
            return Err(CourseProgressError::PercentageOutOfRange(
                progress_percentage,
            ));
        }

        Ok(Self {
            user_id,
            course_id,
            total_lessons,
            completed_lessons,
            progress_percentage,
            enrolled_at,
            is_completed,
            completed_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn total_lessons(&self) -> u32 {
        self.total_lessons
    }

    #[must_use]
    pub fn completed_lessons(&self) -> u32 {
        self.completed_lessons
    }

    #[must_use]
    pub fn progress_percentage(&self) -> f32 {
        self.progress_percentage
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn enrolled() -> CourseProgress {
        CourseProgress::enroll(UserId::generate(), CourseId::new(1), 2, fixed_now())
    }

    #[test]
    fn enrollment_starts_at_zero() {
        let course = enrolled();
        assert_eq!(course.completed_lessons(), 0);
        assert_eq!(course.progress_percentage(), 0.0);
        assert!(!course.is_completed());
    }

    #[test]
    fn recount_transitions_once() {
        let mut course = enrolled();
        let now = fixed_now();

        assert!(!course.apply_recount(2, 1, now).unwrap());
        assert_eq!(course.progress_percentage(), 50.0);

        assert!(course.apply_recount(2, 2, now).unwrap());
        assert_eq!(course.completed_at(), Some(now));

        let later = now + chrono::Duration::minutes(1);
        assert!(!course.apply_recount(2, 2, later).unwrap());
        assert_eq!(course.completed_at(), Some(now));
    }

    #[test]
    fn lesson_added_to_catalog_reopens_course() {
        let mut course = enrolled();
        let now = fixed_now();
        course.apply_recount(2, 2, now).unwrap();

        let later = now + chrono::Duration::hours(1);
        assert!(!course.apply_recount(3, 2, later).unwrap());
        assert!(!course.is_completed());
        assert_eq!(course.completed_at(), Some(now));
    }

    #[test]
    fn from_persisted_validates_consistency() {
        let user = UserId::generate();
        let course = CourseId::new(1);
        let now = fixed_now();

        let err =
            CourseProgress::from_persisted(user, course, 2, 2, 100.0, now, false, None).unwrap_err();
        assert_eq!(err, CourseProgressError::CompletionFlagMismatch);

        let ok = CourseProgress::from_persisted(user, course, 2, 1, 50.0, now, false, None).unwrap();
        assert_eq!(ok.state(), ProgressState::InProgress);
    }
}
