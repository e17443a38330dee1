use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use progress_core::model::{
    CourseId, CourseProgress, LessonId, ModuleId, UserId,
};
use progress_core::time::Clock;
use storage::repository::{
    CatalogReader, CourseProgressRepository, LessonProgressRepository, ModuleProgressRepository,
    StorageError,
};

use crate::error::{ProgressError, unit_count};
use crate::views::{
    CourseProgressDetail, CourseProgressView, LessonProgressView, ModuleProgressView,
};

//
// ─── COURSE UPDATE ─────────────────────────────────────────────────────────────
//

/// Result of a course recompute, mirroring the lesson-level shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseUpdate {
    pub progress: CourseProgress,
    pub transitioned: bool,
}

//
// ─── AGGREGATOR ────────────────────────────────────────────────────────────────
//

/// Recomputes a course's progress record from the lesson records beneath
/// it, and serves the per-course detail read.
///
/// Same pull-based algorithm as the lesson aggregator, one level up. The
/// detail read is pure: units the user has never touched are synthesized
/// as in-memory placeholders, never written.
pub struct CourseProgressAggregator {
    clock: Clock,
    modules: Arc<dyn ModuleProgressRepository>,
    lessons: Arc<dyn LessonProgressRepository>,
    courses: Arc<dyn CourseProgressRepository>,
    catalog: Arc<dyn CatalogReader>,
}

impl CourseProgressAggregator {
    #[must_use]
    pub fn new(
        clock: Clock,
        modules: Arc<dyn ModuleProgressRepository>,
        lessons: Arc<dyn LessonProgressRepository>,
        courses: Arc<dyn CourseProgressRepository>,
        catalog: Arc<dyn CatalogReader>,
    ) -> Self {
        Self {
            clock,
            modules,
            lessons,
            courses,
            catalog,
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Creates the course progress record at enrollment time.
    ///
    /// The entitlement decision is the calling collaborator's; this only
    /// persists the record shape the engine owns. Idempotent: re-enrolling
    /// returns the existing record unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` for a course outside the
    /// catalog, or a storage error if persistence fails.
    pub async fn record_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress, ProgressError> {
        let lesson_ids = self.course_lessons(course_id).await?;
        let total_lessons = unit_count(lesson_ids.len())?;

        if let Some(existing) = self.courses.get_course_progress(user_id, course_id).await? {
            debug!(%user_id, %course_id, "re-enrollment, keeping existing record");
            return Ok(existing);
        }

        let record = CourseProgress::enroll(user_id, course_id, total_lessons, self.clock.now());
        self.courses.upsert_course_progress(&record).await?;

        info!(%user_id, %course_id, total_lessons, "user enrolled");
        Ok(record)
    }

    /// Recomputes the course's record from current stored lesson facts.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` for a course outside the
    /// catalog, `ProgressError::NotEnrolled` when no progress record exists
    /// (enrollment precedes progress), or a storage error.
    pub async fn recompute_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseUpdate, ProgressError> {
        let lesson_ids = self.course_lessons(course_id).await?;
        let total_lessons = unit_count(lesson_ids.len())?;

        let lesson_records = self
            .lessons
            .list_lesson_completions(user_id, &lesson_ids)
            .await?;
        let completed_lessons =
            unit_count(lesson_records.iter().filter(|r| r.is_completed()).count())?;

        let mut record = self
            .courses
            .get_course_progress(user_id, course_id)
            .await?
            .ok_or(ProgressError::NotEnrolled { user_id, course_id })?;

        let now = self.clock.now();
        let transitioned = record.apply_recount(total_lessons, completed_lessons, now)?;
        self.courses.upsert_course_progress(&record).await?;

        if transitioned {
            info!(%user_id, %course_id, completed_lessons, total_lessons, "course completed");
        } else {
            debug!(
                %user_id, %course_id, completed_lessons, total_lessons,
                percentage = record.progress_percentage(),
                "course recomputed"
            );
        }

        Ok(CourseUpdate {
            progress: record,
            transitioned,
        })
    }

    /// Assembles the full course tree for a user: stored progress, every
    /// catalog lesson, every catalog module, with zero-valued placeholders
    /// where no record exists yet.
    ///
    /// Pure read: never creates or mutates records.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotEnrolled` when the user has no progress
    /// record for the course, `ProgressError::CourseNotFound` for a course
    /// outside the catalog, or a storage error.
    pub async fn course_detail(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgressDetail, ProgressError> {
        let progress = self
            .courses
            .get_course_progress(user_id, course_id)
            .await?
            .ok_or(ProgressError::NotEnrolled { user_id, course_id })?;

        let lesson_ids = self.course_lessons(course_id).await?;
        let lesson_records: HashMap<LessonId, _> = self
            .lessons
            .list_lesson_completions(user_id, &lesson_ids)
            .await?
            .into_iter()
            .map(|r| (r.lesson_id(), r))
            .collect();

        let mut lessons = Vec::with_capacity(lesson_ids.len());
        for lesson_id in lesson_ids {
            let module_ids = self
                .catalog
                .module_ids_for_lesson(lesson_id)
                .await
                .map_err(|e| match e {
                    StorageError::NotFound => ProgressError::LessonNotFound(lesson_id),
                    other => ProgressError::Storage(other),
                })?;

            let module_records: HashMap<ModuleId, _> = self
                .modules
                .list_module_completions(user_id, &module_ids)
                .await?
                .into_iter()
                .map(|r| (r.module_id(), r))
                .collect();

            let module_views: Vec<ModuleProgressView> = module_ids
                .iter()
                .map(|id| {
                    module_records.get(id).map_or_else(
                        || ModuleProgressView::placeholder(*id),
                        ModuleProgressView::from_record,
                    )
                })
                .collect();

            let view = match lesson_records.get(&lesson_id) {
                Some(record) => LessonProgressView::from_record(record, module_views),
                None => LessonProgressView::placeholder(
                    lesson_id,
                    unit_count(module_ids.len())?,
                    module_views,
                ),
            };
            lessons.push(view);
        }

        Ok(CourseProgressDetail {
            progress: CourseProgressView::from_record(&progress),
            lessons,
        })
    }

    async fn course_lessons(&self, course_id: CourseId) -> Result<Vec<LessonId>, ProgressError> {
        self.catalog
            .lesson_ids_for_course(course_id)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => ProgressError::CourseNotFound(course_id),
                other => ProgressError::Storage(other),
            })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{LessonCompletion, ProgressState};
    use progress_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    fn aggregator_with(repo: &InMemoryRepository) -> CourseProgressAggregator {
        CourseProgressAggregator::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    fn seeded() -> (InMemoryRepository, UserId) {
        let repo = InMemoryRepository::new();
        repo.add_course(CourseId::new(1));
        repo.add_lesson(CourseId::new(1), LessonId::new(10));
        repo.add_lesson(CourseId::new(1), LessonId::new(11));
        repo.add_module(LessonId::new(10), ModuleId::new(100));
        repo.add_module(LessonId::new(11), ModuleId::new(110));
        repo.add_module(LessonId::new(11), ModuleId::new(111));
        repo.add_module(LessonId::new(11), ModuleId::new(112));
        (repo, UserId::generate())
    }

    async fn store_completed_lesson(repo: &InMemoryRepository, user: UserId, lesson: u64, total: u32) {
        let mut record = LessonCompletion::stub(user, LessonId::new(lesson), total, fixed_now());
        record.apply_recount(total, total, fixed_now()).unwrap();
        repo.upsert_lesson_completion(&record).await.unwrap();
    }

    #[tokio::test]
    async fn enrollment_is_idempotent() {
        let (repo, user) = seeded();
        let aggregator = aggregator_with(&repo);

        let first = aggregator
            .record_enrollment(user, CourseId::new(1))
            .await
            .unwrap();
        assert_eq!(first.total_lessons(), 2);

        let second = aggregator
            .record_enrollment(user, CourseId::new(1))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn recompute_requires_enrollment() {
        let (repo, user) = seeded();
        let aggregator = aggregator_with(&repo);

        let err = aggregator
            .recompute_course(user, CourseId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::NotEnrolled { .. }));
    }

    #[tokio::test]
    async fn recompute_counts_completed_lessons() {
        let (repo, user) = seeded();
        let aggregator = aggregator_with(&repo);
        aggregator
            .record_enrollment(user, CourseId::new(1))
            .await
            .unwrap();
        store_completed_lesson(&repo, user, 10, 1).await;

        let update = aggregator
            .recompute_course(user, CourseId::new(1))
            .await
            .unwrap();
        assert!(!update.transitioned);
        assert_eq!(update.progress.completed_lessons(), 1);
        assert_eq!(update.progress.progress_percentage(), 50.0);

        store_completed_lesson(&repo, user, 11, 3).await;
        let update = aggregator
            .recompute_course(user, CourseId::new(1))
            .await
            .unwrap();
        assert!(update.transitioned);
        assert!(update.progress.is_completed());
    }

    #[tokio::test]
    async fn detail_synthesizes_placeholders_without_writing() {
        let (repo, user) = seeded();
        let aggregator = aggregator_with(&repo);
        aggregator
            .record_enrollment(user, CourseId::new(1))
            .await
            .unwrap();
        store_completed_lesson(&repo, user, 10, 1).await;

        let detail = aggregator
            .course_detail(user, CourseId::new(1))
            .await
            .unwrap();

        assert_eq!(detail.lessons.len(), 2);
        let untouched = &detail.lessons[1];
        assert_eq!(untouched.lesson_id, LessonId::new(11));
        assert_eq!(untouched.state, ProgressState::NotStarted);
        assert_eq!(untouched.total_modules, 3);
        assert_eq!(untouched.completion_percentage, 0.0);
        assert_eq!(untouched.modules.len(), 3);
        assert!(untouched.modules.iter().all(|m| !m.is_completed));

        // Pure read: the placeholder lesson must not have been persisted.
        assert!(
            repo.get_lesson_completion(user, LessonId::new(11))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn detail_without_enrollment_is_not_found() {
        let (repo, user) = seeded();
        let aggregator = aggregator_with(&repo);

        let err = aggregator
            .course_detail(user, CourseId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::NotEnrolled { .. }));
    }
}
