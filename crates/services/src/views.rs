//! Presentation-agnostic read views.
//!
//! These are intentionally **not** UI view-models: no pre-formatted strings,
//! no localization assumptions. Placeholder entries are synthesized in
//! memory for units the user has never touched, so a detail read always
//! shows the complete catalog tree at 0% rather than gaps. Reads never
//! create records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use progress_core::model::{
    CourseId, CourseProgress, LessonCompletion, LessonId, ModuleCompletion, ModuleId,
    ProgressState,
};

/// Per-module entry in a course detail view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleProgressView {
    pub module_id: ModuleId,
    pub state: ProgressState,
    pub is_completed: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ModuleProgressView {
    #[must_use]
    pub fn from_record(record: &ModuleCompletion) -> Self {
        Self {
            module_id: record.module_id(),
            state: record.state(),
            is_completed: record.is_completed(),
            started_at: record.started_at(),
            completed_at: record.completed_at(),
        }
    }

    /// Zero-valued entry for a module the user has never touched.
    #[must_use]
    pub fn placeholder(module_id: ModuleId) -> Self {
        Self {
            module_id,
            state: ProgressState::absent(),
            is_completed: false,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Per-lesson entry in a course detail view, with its module entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonProgressView {
    pub lesson_id: LessonId,
    pub state: ProgressState,
    pub total_modules: u32,
    pub completed_modules: u32,
    pub completion_percentage: f32,
    pub video_progress_percentage: Option<f32>,
    pub is_completed: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub modules: Vec<ModuleProgressView>,
}

impl LessonProgressView {
    #[must_use]
    pub fn from_record(record: &LessonCompletion, modules: Vec<ModuleProgressView>) -> Self {
        Self {
            lesson_id: record.lesson_id(),
            state: record.state(),
            total_modules: record.total_modules(),
            completed_modules: record.completed_modules(),
            completion_percentage: record.completion_percentage(),
            video_progress_percentage: record.video_progress_percentage(),
            is_completed: record.is_completed(),
            started_at: record.started_at(),
            completed_at: record.completed_at(),
            modules,
        }
    }

    /// Zero-valued entry for a lesson with no stored completion record.
    ///
    /// `total_modules` still reflects the catalog, so the tree shape is
    /// complete even at 0%.
    #[must_use]
    pub fn placeholder(
        lesson_id: LessonId,
        total_modules: u32,
        modules: Vec<ModuleProgressView>,
    ) -> Self {
        Self {
            lesson_id,
            state: ProgressState::absent(),
            total_modules,
            completed_modules: 0,
            completion_percentage: 0.0,
            video_progress_percentage: None,
            is_completed: false,
            started_at: None,
            completed_at: None,
            modules,
        }
    }
}

/// Stored course progress, flattened for the boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseProgressView {
    pub course_id: CourseId,
    pub state: ProgressState,
    pub total_lessons: u32,
    pub completed_lessons: u32,
    pub progress_percentage: f32,
    pub enrolled_at: DateTime<Utc>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CourseProgressView {
    #[must_use]
    pub fn from_record(record: &CourseProgress) -> Self {
        Self {
            course_id: record.course_id(),
            state: record.state(),
            total_lessons: record.total_lessons(),
            completed_lessons: record.completed_lessons(),
            progress_percentage: record.progress_percentage(),
            enrolled_at: record.enrolled_at(),
            is_completed: record.is_completed(),
            completed_at: record.completed_at(),
        }
    }
}

/// Full per-course tree: stored progress plus one entry per catalog lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseProgressDetail {
    pub progress: CourseProgressView,
    pub lessons: Vec<LessonProgressView>,
}

/// Aggregate counters folded over a user's course details.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub enrolled_courses: u32,
    pub completed_courses: u32,
    pub completed_lessons: u32,
    pub completed_modules: u32,
}

/// Per-user summary across all enrolled courses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub courses: Vec<CourseProgressDetail>,
    pub stats: DashboardStats,
}
