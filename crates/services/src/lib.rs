#![forbid(unsafe_code)]

pub mod app_services;
pub mod cascade;
pub mod course_aggregator;
pub mod dashboard;
pub mod error;
pub mod lesson_aggregator;
pub mod module_tracker;
pub mod outcome;
pub mod views;

pub use progress_core::Clock;

pub use app_services::AppServices;
pub use cascade::{FactOutcome, ProgressEngine};
pub use course_aggregator::{CourseProgressAggregator, CourseUpdate};
pub use dashboard::ProgressDashboardReader;
pub use error::{AppServicesError, ErrorKind, ProgressError};
pub use lesson_aggregator::{LessonProgressAggregator, LessonUpdate};
pub use module_tracker::{ModuleProgressTracker, ModuleUpdate};
pub use outcome::OperationOutcome;
pub use views::{
    CourseProgressDetail, CourseProgressView, DashboardStats, DashboardView, LessonProgressView,
    ModuleProgressView,
};
