use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{ModuleId, UserId};
use crate::model::state::ProgressState;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModuleCompletionError {
    #[error("is_completed does not match presence of completed_at")]
    CompletionFlagMismatch,

    #[error("completed_at is before started_at")]
    CompletedBeforeStarted,
}

//
// ─── MODULE COMPLETION ─────────────────────────────────────────────────────────
//

/// Per-(user, module) completion record, the leaf of the hierarchy.
///
/// Created lazily on the first fact for the pair. `is_completed` is
/// monotonic: once true it never reverts, and `completed_at` never changes
/// after it is first set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCompletion {
    user_id: UserId,
    module_id: ModuleId,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    is_completed: bool,
}

impl ModuleCompletion {
    /// Creates the record for a first "started" fact.
    #[must_use]
    pub fn start(user_id: UserId, module_id: ModuleId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            module_id,
            started_at: Some(now),
            completed_at: None,
            is_completed: false,
        }
    }

    /// Marks the module completed. Returns whether a transition occurred.
    ///
    /// Idempotent: a second call observes `is_completed` and does nothing.
    /// The transition flag is what tells callers whether to cascade.
    pub fn complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        // A "completed" fact can arrive without a preceding "started" one.
        self.started_at.get_or_insert(now);
        self.completed_at = Some(now);
        self.is_completed = true;
        true
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ModuleCompletionError` if the completion flag disagrees with
    /// the timestamp or the timestamps are out of order.
    pub fn from_persisted(
        user_id: UserId,
        module_id: ModuleId,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        is_completed: bool,
    ) -> Result<Self, ModuleCompletionError> {
        if completed_at.is_some() != is_completed {
            return Err(ModuleCompletionError::CompletionFlagMismatch);
        }
        if let (Some(started), Some(completed)) = (started_at, completed_at) {
            if completed < started {
                return Err(ModuleCompletionError::CompletedBeforeStarted);
            }
        }

        Ok(Self {
            user_id,
            module_id,
            started_at,
            completed_at,
            is_completed,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.module_id
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
    pub fn is_completed(&self) -> bool {
        self.is_completed
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

    fn ids() -> (UserId, ModuleId) {
        (UserId::generate(), ModuleId::new(7))
    }

    #[test]
    fn start_sets_started_only() {
        let (user, module) = ids();
        let now = fixed_now();
        let record = ModuleCompletion::start(user, module, now);

        assert_eq!(record.started_at(), Some(now));
        assert_eq!(record.completed_at(), None);
        assert!(!record.is_completed());
        assert_eq!(record.state(), ProgressState::InProgress);
    }

    #[test]
    fn complete_transitions_once() {
        let (user, module) = ids();
        let now = fixed_now();
        let mut record = ModuleCompletion::start(user, module, now);

        let later = now + chrono::Duration::minutes(5);
        assert!(record.complete(later));
        assert_eq!(record.completed_at(), Some(later));
        assert!(record.is_completed());

        // Second completion is a no-op and must not move the timestamp.
        let even_later = later + chrono::Duration::minutes(5);
        assert!(!record.complete(even_later));
        assert_eq!(record.completed_at(), Some(later));
    }

    #[test]
    fn complete_without_start_backfills_started_at() {
        let (user, module) = ids();
        let now = fixed_now();
        let mut record = ModuleCompletion::start(user, module, now);
        record.started_at = None;

        assert!(record.complete(now));
        assert_eq!(record.started_at(), Some(now));
    }

    #[test]
    fn from_persisted_rejects_flag_mismatch() {
        let (user, module) = ids();
        let now = fixed_now();

        let err = ModuleCompletion::from_persisted(user, module, Some(now), Some(now), false)
            .unwrap_err();
        assert_eq!(err, ModuleCompletionError::CompletionFlagMismatch);

        let err =
            ModuleCompletion::from_persisted(user, module, Some(now), None, true).unwrap_err();
        assert_eq!(err, ModuleCompletionError::CompletionFlagMismatch);
    }

    #[test]
    fn from_persisted_rejects_reversed_timestamps() {
        let (user, module) = ids();
        let now = fixed_now();
        let earlier = now - chrono::Duration::hours(1);

        let err = ModuleCompletion::from_persisted(user, module, Some(now), Some(earlier), true)
            .unwrap_err();
        assert_eq!(err, ModuleCompletionError::CompletedBeforeStarted);
    }

    #[test]
    fn from_persisted_accepts_valid_rows() {
        let (user, module) = ids();
        let now = fixed_now();

        let record =
            ModuleCompletion::from_persisted(user, module, Some(now), Some(now), true).unwrap();
        assert_eq!(record.state(), ProgressState::Completed);
    }
}
