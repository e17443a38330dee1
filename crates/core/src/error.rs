use thiserror::Error;

use crate::model::CourseProgressError;
use crate::model::LessonCompletionError;
use crate::model::ModuleCompletionError;

/// Union of the domain record errors.
///
/// All three surface persisted rows that violate a record invariant; they
/// are storage faults, not user errors, and callers treat them as
/// non-retryable.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Module(#[from] ModuleCompletionError),
    #[error(transparent)]
    Lesson(#[from] LessonCompletionError),
    #[error(transparent)]
    Course(#[from] CourseProgressError),
}
