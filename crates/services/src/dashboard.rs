use std::sync::Arc;

use tracing::debug;

use progress_core::model::UserId;
use storage::repository::CourseProgressRepository;

use crate::course_aggregator::CourseProgressAggregator;
use crate::error::ProgressError;
use crate::views::{DashboardStats, DashboardView};

/// Read-only composition over the course aggregator that assembles a
/// per-user summary across all enrolled courses.
///
/// Never mutates anything. If any course's detail fetch fails, the whole
/// dashboard fails; silently omitting a course would understate the
/// user's enrollment and mask a data problem.
pub struct ProgressDashboardReader {
    courses: Arc<dyn CourseProgressRepository>,
    aggregator: Arc<CourseProgressAggregator>,
}

impl ProgressDashboardReader {
    #[must_use]
    pub fn new(
        courses: Arc<dyn CourseProgressRepository>,
        aggregator: Arc<CourseProgressAggregator>,
    ) -> Self {
        Self {
            courses,
            aggregator,
        }
    }

    /// Assembles the dashboard for one user.
    ///
    /// The statistics block is a fold over stored counts; no recomputation
    /// happens on the read path.
    ///
    /// # Errors
    ///
    /// Returns the first failure from any course's detail assembly, or a
    /// storage error from the enrollment listing.
    pub async fn dashboard(&self, user_id: UserId) -> Result<DashboardView, ProgressError> {
        let enrollments = self.courses.list_course_progress(user_id).await?;

        let mut stats = DashboardStats::default();
        let mut courses = Vec::with_capacity(enrollments.len());

        for enrollment in enrollments {
            let detail = self
                .aggregator
                .course_detail(user_id, enrollment.course_id())
                .await?;

            stats.enrolled_courses += 1;
            if detail.progress.is_completed {
                stats.completed_courses += 1;
            }
            stats.completed_lessons += detail.progress.completed_lessons;
            stats.completed_modules += detail
                .lessons
                .iter()
                .map(|lesson| lesson.completed_modules)
                .sum::<u32>();

            courses.push(detail);
        }

        debug!(
            %user_id,
            enrolled = stats.enrolled_courses,
            completed = stats.completed_courses,
            "dashboard assembled"
        );

        Ok(DashboardView { courses, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::CourseId;
    use progress_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn empty_dashboard_for_unenrolled_user() {
        let repo = InMemoryRepository::new();
        let aggregator = Arc::new(CourseProgressAggregator::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        ));
        let reader = ProgressDashboardReader::new(Arc::new(repo), aggregator);

        let view = reader.dashboard(UserId::generate()).await.unwrap();
        assert!(view.courses.is_empty());
        assert_eq!(view.stats, DashboardStats::default());
    }

    #[tokio::test]
    async fn dashboard_fails_hard_when_a_course_detail_fails() {
        let repo = InMemoryRepository::new();
        let user = UserId::generate();
        let aggregator = Arc::new(CourseProgressAggregator::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        ));

        // Enroll against a seeded catalog entry, then orphan the progress
        // record by using a fresh catalog-less backend for reads.
        repo.add_course(CourseId::new(1));
        repo.add_lesson(CourseId::new(1), progress_core::model::LessonId::new(10));
        aggregator
            .record_enrollment(user, CourseId::new(1))
            .await
            .unwrap();

        let broken = InMemoryRepository::new();
        let broken_aggregator = Arc::new(CourseProgressAggregator::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(broken),
        ));
        let reader = ProgressDashboardReader::new(Arc::new(repo), broken_aggregator);

        let err = reader.dashboard(user).await.unwrap_err();
        assert!(matches!(err, ProgressError::CourseNotFound(_)));
    }
}
