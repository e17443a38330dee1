use std::fmt;

use chrono::{DateTime, Utc};
use progress_core::model::{CourseId, CourseProgress, LessonId, ModuleId, UserId};
use storage::repository::CourseProgressRepository;
use storage::sqlite::SqliteRepository;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: CourseId,
    course_title: String,
    lessons: u32,
    modules_per_lesson: u32,
    enroll: Option<UserId>,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCourseId { raw: String },
    InvalidLessons { raw: String },
    InvalidModules { raw: String },
    InvalidUser { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCourseId { raw } => write!(f, "invalid --course-id value: {raw}"),
            ArgsError::InvalidLessons { raw } => write!(f, "invalid --lessons value: {raw}"),
            ArgsError::InvalidModules { raw } => write!(f, "invalid --modules value: {raw}"),
            ArgsError::InvalidUser { raw } => {
                write!(f, "invalid --enroll value (expected UUID): {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("PROGRESS_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut course_id = std::env::var("PROGRESS_COURSE_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| CourseId::new(1), CourseId::new);
        let mut course_title =
            std::env::var("PROGRESS_COURSE_TITLE").unwrap_or_else(|_| "Rust Fundamentals".into());
        let mut lessons = std::env::var("PROGRESS_LESSONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
        let mut modules_per_lesson = std::env::var("PROGRESS_MODULES")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(4);
        let mut enroll: Option<UserId> = None;
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-id" => {
                    let value = require_value(&mut args, "--course-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidCourseId { raw: value.clone() })?;
                    course_id = CourseId::new(parsed);
                }
                "--course-title" => {
                    let value = require_value(&mut args, "--course-title")?;
                    course_title = value;
                }
                "--lessons" => {
                    let value = require_value(&mut args, "--lessons")?;
                    lessons = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidLessons { raw: value.clone() })?;
                }
                "--modules" => {
                    let value = require_value(&mut args, "--modules")?;
                    modules_per_lesson = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidModules { raw: value.clone() })?;
                }
                "--enroll" => {
                    let value = require_value(&mut args, "--enroll")?;
                    let parsed = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUser { raw: value.clone() })?;
                    enroll = Some(parsed);
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_id,
            course_title,
            lessons,
            modules_per_lesson,
            enroll,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --course-id <id>          Course id to seed (default: 1)");
    eprintln!("  --course-title <name>     Course title (default: Rust Fundamentals)");
    eprintln!("  --lessons <n>             Lessons to create (default: 3)");
    eprintln!("  --modules <n>             Modules per lesson (default: 4)");
    eprintln!("  --enroll <user_uuid>      Also enroll this user in the course");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  PROGRESS_DB_URL, PROGRESS_COURSE_ID, PROGRESS_COURSE_TITLE, PROGRESS_LESSONS, PROGRESS_MODULES"
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;
    let now = args.now.unwrap_or_else(Utc::now);

    repo.insert_course(args.course_id, &args.course_title)
        .await?;

    let base = args.course_id.value() * 1_000;
    for l in 0..args.lessons {
        let lesson_id = LessonId::new(base + u64::from(l) + 1);
        repo.insert_lesson(args.course_id, lesson_id, &format!("Lesson {}", l + 1), l)
            .await?;

        for m in 0..args.modules_per_lesson {
            let module_id = ModuleId::new(lesson_id.value() * 100 + u64::from(m) + 1);
            repo.insert_module(
                lesson_id,
                module_id,
                &format!("Module {}.{}", l + 1, m + 1),
                m,
            )
            .await?;
        }
    }

    if let Some(user) = args.enroll {
        let enrollment = CourseProgress::enroll(user, args.course_id, args.lessons, now);
        repo.upsert_course_progress(&enrollment).await?;
        println!("Enrolled user {user} in course {}", args.course_id.value());
    }

    println!(
        "Seeded course {} ({} lessons x {} modules) into {}",
        args.course_id.value(),
        args.lessons,
        args.modules_per_lesson,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
