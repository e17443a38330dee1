use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use progress_core::model::{LessonCompletion, LessonId, ModuleId, UserId};
use progress_core::time::Clock;
use storage::repository::{
    CatalogReader, LessonProgressRepository, ModuleProgressRepository, StorageError,
};

use crate::error::{ProgressError, unit_count};

//
// ─── LESSON UPDATE ─────────────────────────────────────────────────────────────
//

/// Result of a lesson recompute. `transitioned` is true only when this call
/// flipped the lesson to completed, directing the caller whether to cascade
/// to the course level.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonUpdate {
    pub completion: LessonCompletion,
    pub transitioned: bool,
}

//
// ─── AGGREGATOR ────────────────────────────────────────────────────────────────
//

/// Recomputes a lesson's completion record from the module records beneath
/// it.
///
/// The recompute is pull-based, never incremental: both `total_modules`
/// (from the catalog) and `completed_modules` (from stored module records)
/// are re-derived on every call, so concurrent or replayed facts converge
/// to the same counts regardless of interleaving.
pub struct LessonProgressAggregator {
    clock: Clock,
    modules: Arc<dyn ModuleProgressRepository>,
    lessons: Arc<dyn LessonProgressRepository>,
    catalog: Arc<dyn CatalogReader>,
}

impl LessonProgressAggregator {
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

    /// Recomputes the lesson's record from current stored facts.
    ///
    /// A lesson with modules but no completion records counts as zero
    /// completed, not an error. A lesson whose catalog membership grew past
    /// a previous 100% correctly reopens.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::LessonNotFound` for a lesson outside the
    /// catalog, or a storage error if a read or the write fails (in which
    /// case the stored record is untouched).
    pub async fn recompute_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<LessonUpdate, ProgressError> {
        let module_ids = self.lesson_modules(lesson_id).await?;
        let total_modules = unit_count(module_ids.len())?;

        let module_records = self
            .modules
            .list_module_completions(user_id, &module_ids)
            .await?;
        let completed_modules =
            unit_count(module_records.iter().filter(|r| r.is_completed()).count())?;

        let now = self.clock.now();
        let mut record = match self.lessons.get_lesson_completion(user_id, lesson_id).await? {
            Some(existing) => existing,
            None => LessonCompletion::stub(user_id, lesson_id, total_modules, now),
        };

        let transitioned = record.apply_recount(total_modules, completed_modules, now)?;
        self.lessons.upsert_lesson_completion(&record).await?;

        if transitioned {
            info!(%user_id, %lesson_id, completed_modules, total_modules, "lesson completed");
        } else {
            debug!(
                %user_id, %lesson_id, completed_modules, total_modules,
                percentage = record.completion_percentage(),
                "lesson recomputed"
            );
        }

        Ok(LessonUpdate {
            completion: record,
            transitioned,
        })
    }

    /// Stores an externally supplied video-progress signal on the lesson
    /// record, lazily creating the record if needed. The signal is never
    /// derived here and never touched by recomputes.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::LessonNotFound` for a lesson outside the
    /// catalog, or a storage error if persistence fails.
    pub async fn record_video_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        percentage: f32,
    ) -> Result<LessonCompletion, ProgressError> {
        let module_ids = self.lesson_modules(lesson_id).await?;
        let total_modules = unit_count(module_ids.len())?;

        let now = self.clock.now();
        let mut record = match self.lessons.get_lesson_completion(user_id, lesson_id).await? {
            Some(existing) => existing,
            None => LessonCompletion::stub(user_id, lesson_id, total_modules, now),
        };

        record.set_video_progress(percentage);
        self.lessons.upsert_lesson_completion(&record).await?;

        debug!(%user_id, %lesson_id, percentage, "video progress recorded");
        Ok(record)
    }

    async fn lesson_modules(&self, lesson_id: LessonId) -> Result<Vec<ModuleId>, ProgressError> {
        self.catalog
            .module_ids_for_lesson(lesson_id)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => ProgressError::LessonNotFound(lesson_id),
                other => ProgressError::Storage(other),
            })
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
