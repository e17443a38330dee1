use std::sync::Arc;

use storage::repository::{InMemoryRepository, Storage};

use crate::Clock;
use crate::cascade::ProgressEngine;
use crate::course_aggregator::CourseProgressAggregator;
use crate::dashboard::ProgressDashboardReader;
use crate::error::AppServicesError;
use crate::lesson_aggregator::LessonProgressAggregator;

/// Assembles the engine and read surfaces over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    engine: Arc<ProgressEngine>,
    course_aggregator: Arc<CourseProgressAggregator>,
    lesson_aggregator: Arc<LessonProgressAggregator>,
    dashboard: Arc<ProgressDashboardReader>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if connection or migration fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::with_storage(&storage, clock))
    }

    /// Build services over an in-memory backend (tests, prototyping).
    #[must_use]
    pub fn new_in_memory(repo: InMemoryRepository, clock: Clock) -> Self {
        Self::with_storage(&Storage::from_in_memory(repo), clock)
    }

    #[must_use]
    pub fn with_storage(storage: &Storage, clock: Clock) -> Self {
        let engine = Arc::new(ProgressEngine::new(clock, storage));
        let course_aggregator = Arc::new(CourseProgressAggregator::new(
            clock,
            Arc::clone(&storage.modules),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.courses),
            Arc::clone(&storage.catalog),
        ));
        let lesson_aggregator = Arc::new(LessonProgressAggregator::new(
            clock,
            Arc::clone(&storage.modules),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.catalog),
        ));
        let dashboard = Arc::new(ProgressDashboardReader::new(
            Arc::clone(&storage.courses),
            Arc::clone(&course_aggregator),
        ));

        Self {
            engine,
            course_aggregator,
            lesson_aggregator,
            dashboard,
        }
    }

    #[must_use]
    pub fn engine(&self) -> Arc<ProgressEngine> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub fn course_aggregator(&self) -> Arc<CourseProgressAggregator> {
        Arc::clone(&self.course_aggregator)
    }

    #[must_use]
    pub fn lesson_aggregator(&self) -> Arc<LessonProgressAggregator> {
        Arc::clone(&self.lesson_aggregator)
    }

    #[must_use]
    pub fn dashboard(&self) -> Arc<ProgressDashboardReader> {
        Arc::clone(&self.dashboard)
    }
}
