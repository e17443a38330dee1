use std::sync::Arc;

use tracing::debug;

use progress_core::model::{CourseProgress, LessonCompletion, ModuleCompletion, ProgressFact};
use progress_core::time::Clock;
use storage::repository::{CatalogReader, Storage, StorageError};

use crate::course_aggregator::CourseProgressAggregator;
use crate::error::ProgressError;
use crate::lesson_aggregator::LessonProgressAggregator;
use crate::module_tracker::ModuleProgressTracker;

/// What one fact ended up touching. Levels the cascade never reached are
/// `None`; a duplicate completion fact, for example, stops at the module.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FactOutcome {
    pub module: ModuleCompletion,
    pub lesson: Option<LessonCompletion>,
    pub course: Option<CourseProgress>,
}

/// Entry point for inbound facts: owns the strictly one-directional
/// module → lesson → course cascade.
///
/// Each level returns a `transitioned` flag and this caller (never the
/// callee) decides whether to invoke the next level, so the dependency
/// direction stays leaf-to-root and each component is testable against a
/// mock of only its direct dependency. The cascade is sequential and
/// synchronous: a fact is not acknowledged until every level it affects has
/// observed it, and any failure fails the whole fact rather than leaving a
/// silently stale ancestor.
pub struct ProgressEngine {
    tracker: ModuleProgressTracker,
    lessons: LessonProgressAggregator,
    courses: CourseProgressAggregator,
    catalog: Arc<dyn CatalogReader>,
}

impl ProgressEngine {
    /// Wires the engine over a storage aggregate.
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        let tracker = ModuleProgressTracker::new(
            clock,
            Arc::clone(&storage.modules),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.catalog),
        );
        let lessons = LessonProgressAggregator::new(
            clock,
            Arc::clone(&storage.modules),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.catalog),
        );
        let courses = CourseProgressAggregator::new(
            clock,
            Arc::clone(&storage.modules),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.courses),
            Arc::clone(&storage.catalog),
        );
        Self {
            tracker,
            lessons,
            courses,
            catalog: Arc::clone(&storage.catalog),
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &ModuleProgressTracker {
        &self.tracker
    }

    #[must_use]
    pub fn lesson_aggregator(&self) -> &LessonProgressAggregator {
        &self.lessons
    }

    #[must_use]
    pub fn course_aggregator(&self) -> &CourseProgressAggregator {
        &self.courses
    }

    /// Handles one inbound fact to completion.
    ///
    /// Started facts stop at the tracker. Completed facts cascade upward,
    /// but only through levels that actually transitioned: a module
    /// completion that does not finish its lesson triggers one lesson
    /// recompute and no course recompute; a duplicate fact triggers
    /// nothing beyond the idempotent module read.
    ///
    /// # Errors
    ///
    /// Any level's failure fails the whole fact. `NotFound` and
    /// `InvalidState` failures are not retryable; `Storage` failures are
    /// safe to retry with the same fact.
    pub async fn handle_fact(&self, fact: ProgressFact) -> Result<FactOutcome, ProgressError> {
        match fact {
            ProgressFact::ModuleStarted { user_id, module_id } => {
                let update = self.tracker.start_module(user_id, module_id).await?;
                Ok(FactOutcome {
                    module: update.completion,
                    lesson: None,
                    course: None,
                })
            }
            ProgressFact::ModuleCompleted { user_id, module_id } => {
                let update = self.tracker.complete_module(user_id, module_id).await?;
                if !update.transitioned {
                    debug!(%user_id, %module_id, "no module transition, cascade skipped");
                    return Ok(FactOutcome {
                        module: update.completion,
                        lesson: None,
                        course: None,
                    });
                }

                let lesson_id = self
                    .catalog
                    .lesson_id_for_module(module_id)
                    .await
                    .map_err(|e| match e {
                        StorageError::NotFound => ProgressError::ModuleNotFound(module_id),
                        other => ProgressError::Storage(other),
                    })?;
                let lesson_update = self.lessons.recompute_lesson(user_id, lesson_id).await?;

                let course = if lesson_update.transitioned {
                    let course_id = self
                        .catalog
                        .course_id_for_lesson(lesson_id)
                        .await
                        .map_err(|e| match e {
                            StorageError::NotFound => ProgressError::LessonNotFound(lesson_id),
                            other => ProgressError::Storage(other),
                        })?;
                    let course_update = self.courses.recompute_course(user_id, course_id).await?;
                    Some(course_update.progress)
                } else {
                    debug!(%user_id, %lesson_id, "no lesson transition, course recompute skipped");
                    None
                };

                Ok(FactOutcome {
                    module: update.completion,
                    lesson: Some(lesson_update.completion),
                    course,
                })
            }
        }
    }
}
