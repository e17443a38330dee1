use progress_core::model::{
    CourseId, CourseProgress, LessonCompletion, LessonId, ModuleCompletion, ModuleId, UserId,
};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn unit_id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn module_id_from_i64(v: i64) -> Result<ModuleId, StorageError> {
    Ok(ModuleId::new(i64_to_u64("module_id", v)?))
}

/// User ids are persisted as hyphenated UUID strings.
pub(crate) fn user_id_to_string(user_id: UserId) -> String {
    user_id.value().to_string()
}

pub(crate) fn user_id_from_str(s: &str) -> Result<UserId, StorageError> {
    Uuid::parse_str(s)
        .map(UserId::new)
        .map_err(|_| StorageError::Serialization(format!("invalid user_id: {s}")))
}

fn count_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

#[allow(clippy::cast_possible_truncation)]
fn pct_from_f64(v: f64) -> f32 {
    v as f32
}

pub(crate) fn map_module_completion_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ModuleCompletion, StorageError> {
    let user_id = user_id_from_str(&row.try_get::<String, _>("user_id").map_err(ser)?)?;
    let module_id = module_id_from_i64(row.try_get::<i64, _>("module_id").map_err(ser)?)?;

    ModuleCompletion::from_persisted(
        user_id,
        module_id,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
        row.try_get::<i64, _>("is_completed").map_err(ser)? != 0,
    )
    .map_err(ser)
}

pub(crate) fn map_lesson_completion_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LessonCompletion, StorageError> {
    let user_id = user_id_from_str(&row.try_get::<String, _>("user_id").map_err(ser)?)?;
    let lesson_id = lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?;

    LessonCompletion::from_persisted(
        user_id,
        lesson_id,
        count_from_i64(
            "total_modules",
            row.try_get::<i64, _>("total_modules").map_err(ser)?,
        )?,
        count_from_i64(
            "completed_modules",
            row.try_get::<i64, _>("completed_modules").map_err(ser)?,
        )?,
        pct_from_f64(
            row.try_get::<f64, _>("completion_percentage")
                .map_err(ser)?,
        ),
        row.try_get::<Option<f64>, _>("video_progress_percentage")
            .map_err(ser)?
            .map(pct_from_f64),
        row.try_get::<i64, _>("is_completed").map_err(ser)? != 0,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_course_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<CourseProgress, StorageError> {
    let user_id = user_id_from_str(&row.try_get::<String, _>("user_id").map_err(ser)?)?;
    let course_id = course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?;

    CourseProgress::from_persisted(
        user_id,
        course_id,
        count_from_i64(
            "total_lessons",
            row.try_get::<i64, _>("total_lessons").map_err(ser)?,
        )?,
        count_from_i64(
            "completed_lessons",
            row.try_get::<i64, _>("completed_lessons").map_err(ser)?,
        )?,
        pct_from_f64(row.try_get::<f64, _>("progress_percentage").map_err(ser)?),
        row.try_get("enrolled_at").map_err(ser)?,
        row.try_get::<i64, _>("is_completed").map_err(ser)? != 0,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}
