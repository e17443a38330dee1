use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use progress_core::model::{LessonCompletion, LessonId, ModuleCompletion, ModuleId, UserId};
use progress_core::time::Clock;
use storage::repository::{
    CatalogReader, LessonProgressRepository, ModuleProgressRepository, StorageError,
};

use crate::error::{ProgressError, unit_count};

//
// ─── MODULE UPDATE ─────────────────────────────────────────────────────────────
//

/// Result of a module-level fact: the stored record plus whether this call
/// flipped it to completed.
///
/// The flag is load-bearing: callers cascade to the lesson aggregator only
/// when it is true, so duplicate facts cost one read instead of a full
/// recompute chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleUpdate {
    pub completion: ModuleCompletion,
    pub transitioned: bool,
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// Owns the per-(user, module) completion record, the leaf of the
/// hierarchy. Both operations are idempotent; neither ever reverts a
/// completion.
pub struct ModuleProgressTracker {
    clock: Clock,
    modules: Arc<dyn ModuleProgressRepository>,
    lessons: Arc<dyn LessonProgressRepository>,
    catalog: Arc<dyn CatalogReader>,
}

impl ModuleProgressTracker {
    #[must_use]
    pub fn new(
        clock: Clock,
        modules: Arc<dyn ModuleProgressRepository>,
        lessons: Arc<dyn LessonProgressRepository>,
        catalog: Arc<dyn CatalogReader>,
    ) -> Self {
        Self {
            clock,
            modules,
            lessons,
            catalog,
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Records a "module started" fact.
    ///
    /// Creates the record on first sight; starting an already-started or
    /// already-completed module returns the stored record unchanged. Also
    /// lazily creates the owning lesson's completion record so the lesson
    /// reads as 0% rather than not-found once any of its modules has been
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ModuleNotFound` for a module outside the
    /// catalog, or a storage error if persistence fails (in which case the
    /// record was not advanced).
    pub async fn start_module(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<ModuleUpdate, ProgressError> {
        let lesson_id = self.owning_lesson(module_id).await?;

        if let Some(existing) = self.modules.get_module_completion(user_id, module_id).await? {
            debug!(%user_id, %module_id, "start fact for known module, no-op");
            return Ok(ModuleUpdate {
                completion: existing,
                transitioned: false,
            });
        }

        let now = self.clock.now();
        let record = ModuleCompletion::start(user_id, module_id, now);
        self.modules.upsert_module_completion(&record).await?;
        self.ensure_lesson_record(user_id, lesson_id, now).await?;

        debug!(%user_id, %module_id, %lesson_id, "module started");
        Ok(ModuleUpdate {
            completion: record,
            transitioned: false,
        })
    }

    /// Records a "module completed" fact.
    ///
    /// A completion fact may arrive without a preceding start (some
    /// collaborators bundle both); the start path runs first in that case.
    /// Completing an already-completed module is a successful no-op with
    /// `transitioned == false`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ModuleNotFound` for a module outside the
    /// catalog, or a storage error if persistence fails.
    pub async fn complete_module(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<ModuleUpdate, ProgressError> {
        let lesson_id = self.owning_lesson(module_id).await?;
        let now = self.clock.now();

        let mut record = match self.modules.get_module_completion(user_id, module_id).await? {
            Some(existing) => existing,
            None => {
                let fresh = ModuleCompletion::start(user_id, module_id, now);
                self.ensure_lesson_record(user_id, lesson_id, now).await?;
                fresh
            }
        };

        let transitioned = record.complete(now);
        if transitioned {
            self.modules.upsert_module_completion(&record).await?;
            info!(%user_id, %module_id, %lesson_id, "module completed");
        } else {
            debug!(%user_id, %module_id, "duplicate completion fact, no-op");
        }

        Ok(ModuleUpdate {
            completion: record,
            transitioned,
        })
    }

    async fn owning_lesson(&self, module_id: ModuleId) -> Result<LessonId, ProgressError> {
        self.catalog
            .lesson_id_for_module(module_id)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => ProgressError::ModuleNotFound(module_id),
                other => ProgressError::Storage(other),
            })
    }

    async fn ensure_lesson_record(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        if self
            .lessons
            .get_lesson_completion(user_id, lesson_id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let module_ids = self.catalog.module_ids_for_lesson(lesson_id).await?;
        let total_modules = unit_count(module_ids.len())?;
        let stub = LessonCompletion::stub(user_id, lesson_id, total_modules, now);
        self.lessons.upsert_lesson_completion(&stub).await?;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::CourseId;
    use progress_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    fn tracker_with(repo: &InMemoryRepository) -> ModuleProgressTracker {
        ModuleProgressTracker::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    fn seeded() -> (InMemoryRepository, UserId) {
        let repo = InMemoryRepository::new();
        repo.add_course(CourseId::new(1));
        repo.add_lesson(CourseId::new(1), LessonId::new(10));
        repo.add_module(LessonId::new(10), ModuleId::new(100));
        repo.add_module(LessonId::new(10), ModuleId::new(101));
        (repo, UserId::generate())
    }

    #[tokio::test]
    async fn start_creates_record_and_lesson_stub() {
        let (repo, user) = seeded();
        let tracker = tracker_with(&repo);

        let update = tracker.start_module(user, ModuleId::new(100)).await.unwrap();
        assert!(!update.transitioned);
        assert!(!update.completion.is_completed());

        let lesson = repo
            .get_lesson_completion(user, LessonId::new(10))
            .await
            .unwrap()
            .expect("lesson stub created");
        assert_eq!(lesson.total_modules(), 2);
        assert_eq!(lesson.completed_modules(), 0);
        assert_eq!(lesson.completion_percentage(), 0.0);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (repo, user) = seeded();
        let tracker = tracker_with(&repo);

        let first = tracker.start_module(user, ModuleId::new(100)).await.unwrap();
        let second = tracker.start_module(user, ModuleId::new(100)).await.unwrap();
        assert_eq!(first.completion, second.completion);
    }

    #[tokio::test]
    async fn complete_without_start_takes_creation_path() {
        let (repo, user) = seeded();
        let tracker = tracker_with(&repo);

        let update = tracker
            .complete_module(user, ModuleId::new(100))
            .await
            .unwrap();
        assert!(update.transitioned);
        assert!(update.completion.is_completed());
        assert!(update.completion.started_at().is_some());

        // The owning lesson was stubbed even though no start fact arrived.
        assert!(
            repo.get_lesson_completion(user, LessonId::new(10))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn duplicate_completion_reports_no_transition() {
        let (repo, user) = seeded();
        let tracker = tracker_with(&repo);

        let first = tracker
            .complete_module(user, ModuleId::new(100))
            .await
            .unwrap();
        assert!(first.transitioned);

        let second = tracker
            .complete_module(user, ModuleId::new(100))
            .await
            .unwrap();
        assert!(!second.transitioned);
        assert_eq!(
            second.completion.completed_at(),
            first.completion.completed_at()
        );
    }

    #[tokio::test]
    async fn unknown_module_is_not_found() {
        let (repo, user) = seeded();
        let tracker = tracker_with(&repo);

        let err = tracker
            .complete_module(user, ModuleId::new(999))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::ModuleNotFound(_)));
    }
}
