mod course;
mod fact;
mod ids;
mod lesson;
mod module;
mod state;

pub use course::{CourseProgress, CourseProgressError};
pub use fact::ProgressFact;
pub use ids::{CourseId, LessonId, ModuleId, ParseIdError, UserId};
pub use lesson::{LessonCompletion, LessonCompletionError, completion_percentage};
pub use module::{ModuleCompletion, ModuleCompletionError};
pub use state::ProgressState;
