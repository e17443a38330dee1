use progress_core::model::{CourseId, CourseProgress, UserId};

use super::SqliteRepository;
use super::mapping::{map_course_progress_row, unit_id_to_i64, user_id_to_string};
use crate::repository::{CourseProgressRepository, StorageError};

#[async_trait::async_trait]
impl CourseProgressRepository for SqliteRepository {
    async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, course_id, total_lessons, completed_lessons,
                   progress_percentage, enrolled_at, is_completed, completed_at
            FROM course_progress
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_id_to_string(user_id))
        .bind(unit_id_to_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_course_progress_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn list_course_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CourseProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT user_id, course_id, total_lessons, completed_lessons,
                   progress_percentage, enrolled_at, is_completed, completed_at
            FROM course_progress
            WHERE user_id = ?1
            ORDER BY course_id ASC
            ",
        )
        .bind(user_id_to_string(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(map_course_progress_row(&row)?);
        }
        Ok(records)
    }

    async fn upsert_course_progress(&self, record: &CourseProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO course_progress (
                user_id, course_id, total_lessons, completed_lessons,
                progress_percentage, enrolled_at, is_completed, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                total_lessons = excluded.total_lessons,
                completed_lessons = excluded.completed_lessons,
                progress_percentage = excluded.progress_percentage,
                enrolled_at = MIN(course_progress.enrolled_at, excluded.enrolled_at),
                is_completed = excluded.is_completed,
                completed_at = COALESCE(
                    MIN(course_progress.completed_at, excluded.completed_at),
                    course_progress.completed_at,
                    excluded.completed_at
                )
            ",
        )
        .bind(user_id_to_string(record.user_id()))
        .bind(unit_id_to_i64("course_id", record.course_id().value())?)
        .bind(i64::from(record.total_lessons()))
        .bind(i64::from(record.completed_lessons()))
        .bind(f64::from(record.progress_percentage()))
        .bind(record.enrolled_at())
        .bind(i64::from(record.is_completed()))
        .bind(record.completed_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
