//! Shared error types for the services crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use progress_core::model::{
    CourseId, CourseProgressError, LessonCompletionError, LessonId, ModuleCompletionError,
    ModuleId, UserId,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Failure taxonomy surfaced across the engine boundary.
///
/// `NotFound` and `InvalidState` are not retryable: the catalog or the
/// stored row will not change by retrying. `Storage` is safe to retry with
/// the same inputs: every write here is idempotent by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Storage,
    InvalidState,
}

/// Errors emitted by the progress trackers, aggregators, and readers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("module {0} is not in the catalog")]
    ModuleNotFound(ModuleId),

    #[error("lesson {0} is not in the catalog")]
    LessonNotFound(LessonId),

    #[error("course {0} is not in the catalog")]
    CourseNotFound(CourseId),

    #[error("user {user_id} has no progress record for course {course_id}")]
    NotEnrolled {
        user_id: UserId,
        course_id: CourseId,
    },

    #[error("catalog returned more units than supported: {len}")]
    CatalogTooLarge { len: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    ModuleRecord(#[from] ModuleCompletionError),

    #[error(transparent)]
    LessonRecord(#[from] LessonCompletionError),

    #[error(transparent)]
    CourseRecord(#[from] CourseProgressError),
}

impl ProgressError {
    /// Maps the error onto the boundary taxonomy.
    ///
    /// Storage serialization failures are corrupt persisted rows, not
    /// transient faults, so they land in `InvalidState` alongside the
    /// domain record errors.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModuleNotFound(_)
            | Self::LessonNotFound(_)
            | Self::CourseNotFound(_)
            | Self::NotEnrolled { .. }
            | Self::Storage(StorageError::NotFound) => ErrorKind::NotFound,
            Self::Storage(StorageError::Serialization(_))
            | Self::CatalogTooLarge { .. }
            | Self::ModuleRecord(_)
            | Self::LessonRecord(_)
            | Self::CourseRecord(_) => ErrorKind::InvalidState,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Storage)
    }
}

/// Narrows a catalog membership size to the stored count width.
///
/// # Errors
///
/// Returns `ProgressError::CatalogTooLarge` if the catalog reports more
/// units than a count column can hold.
pub(crate) fn unit_count(len: usize) -> Result<u32, ProgressError> {
    u32::try_from(len).map_err(|_| ProgressError::CatalogTooLarge { len })
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            ProgressError::ModuleNotFound(ModuleId::new(1)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ProgressError::Storage(StorageError::NotFound).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ProgressError::Storage(StorageError::Connection("down".into())).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            ProgressError::Storage(StorageError::Serialization("bad row".into())).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            ProgressError::CatalogTooLarge { len: 1 << 40 }.kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn only_storage_faults_are_retryable() {
        assert!(ProgressError::Storage(StorageError::Connection("down".into())).is_retryable());
        assert!(!ProgressError::LessonNotFound(LessonId::new(2)).is_retryable());
        assert!(
            !ProgressError::Storage(StorageError::Serialization("bad".into())).is_retryable()
        );
    }
}
