//! CLI surface over the progress aggregation engine.
//!
//! Every command prints the uniform result envelope as JSON, so the same
//! output shape works for shell pipelines and for collaborators replaying
//! facts by hand.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use progress_core::model::{CourseId, LessonId, ModuleId, ProgressFact, UserId};
use services::{AppServices, Clock, OperationOutcome, ProgressError};

#[derive(Parser)]
#[command(name = "progress")]
#[command(about = "Course progress tracking engine", long_about = None)]
struct Cli {
    /// SQLite database URL
    #[arg(long, default_value = "sqlite:dev.sqlite3")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a user in a course (creates the course progress record)
    Enroll {
        /// User UUID
        user: UserId,
        /// Course id
        course: CourseId,
    },
    /// Report a module-started fact
    Start {
        user: UserId,
        module: ModuleId,
    },
    /// Report a module-completed fact (cascades lesson and course recomputes)
    Complete {
        user: UserId,
        module: ModuleId,
    },
    /// Record a video-progress signal on a lesson
    VideoProgress {
        user: UserId,
        lesson: LessonId,
        /// Percentage in [0, 100]
        percentage: f32,
    },
    /// Show the full progress tree for one course
    Detail {
        user: UserId,
        course: CourseId,
    },
    /// Show the per-user dashboard across all enrolled courses
    Dashboard {
        user: UserId,
    },
}

fn print_outcome<T: Serialize>(result: Result<T, ProgressError>, message: &str) -> Result<()> {
    let outcome = match result {
        Ok(data) => OperationOutcome::ok(data, message),
        Err(ref error) => {
            debug!(%error, "operation failed");
            OperationOutcome::err(error)
        }
    };
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let services = AppServices::new_sqlite(&cli.db, Clock::default()).await?;

    match cli.command {
        Commands::Enroll { user, course } => {
            let result = services
                .course_aggregator()
                .record_enrollment(user, course)
                .await;
            print_outcome(result, "enrolled")?;
        }
        Commands::Start { user, module } => {
            let result = services
                .engine()
                .handle_fact(ProgressFact::ModuleStarted {
                    user_id: user,
                    module_id: module,
                })
                .await;
            print_outcome(result, "module start recorded")?;
        }
        Commands::Complete { user, module } => {
            let result = services
                .engine()
                .handle_fact(ProgressFact::ModuleCompleted {
                    user_id: user,
                    module_id: module,
                })
                .await;
            print_outcome(result, "module completion recorded")?;
        }
        Commands::VideoProgress {
            user,
            lesson,
            percentage,
        } => {
            let result = services
                .lesson_aggregator()
                .record_video_progress(user, lesson, percentage)
                .await;
            print_outcome(result, "video progress recorded")?;
        }
        Commands::Detail { user, course } => {
            let result = services.course_aggregator().course_detail(user, course).await;
            print_outcome(result, "course detail")?;
        }
        Commands::Dashboard { user } => {
            let result = services.dashboard().dashboard(user).await;
            print_outcome(result, "dashboard")?;
        }
    }

    Ok(())
}
