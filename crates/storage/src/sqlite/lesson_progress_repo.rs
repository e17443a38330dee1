use progress_core::model::{LessonCompletion, LessonId, UserId};

use super::SqliteRepository;
use super::mapping::{map_lesson_completion_row, unit_id_to_i64, user_id_to_string};
use crate::repository::{LessonProgressRepository, StorageError};

#[async_trait::async_trait]
impl LessonProgressRepository for SqliteRepository {
    async fn get_lesson_completion(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, lesson_id, total_modules, completed_modules,
                   completion_percentage, video_progress_percentage,
                   is_completed, started_at, completed_at
            FROM lesson_completions
            WHERE user_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(user_id_to_string(user_id))
        .bind(unit_id_to_i64("lesson_id", lesson_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_lesson_completion_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn list_lesson_completions(
        &self,
        user_id: UserId,
        lesson_ids: &[LessonId],
    ) -> Result<Vec<LessonCompletion>, StorageError> {
        if lesson_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT user_id, lesson_id, total_modules, completed_modules,
                   completion_percentage, video_progress_percentage,
                   is_completed, started_at, completed_at
            FROM lesson_completions
            WHERE user_id = ?1 AND lesson_id IN (
            ",
        );

        for i in 0..lesson_ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql).bind(user_id_to_string(user_id));
        for id in lesson_ids {
            q = q.bind(unit_id_to_i64("lesson_id", id.value())?);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(map_lesson_completion_row(&row)?);
        }
        Ok(records)
    }

    async fn upsert_lesson_completion(
        &self,
        record: &LessonCompletion,
    ) -> Result<(), StorageError> {
        // Counts and percentage are recompute-derived and take the newest
        // write; timestamps keep the earliest writer; a stored video signal
        // survives writes that do not carry one.
        sqlx::query(
            r"
            INSERT INTO lesson_completions (
                user_id, lesson_id, total_modules, completed_modules,
                completion_percentage, video_progress_percentage,
                is_completed, started_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                total_modules = excluded.total_modules,
                completed_modules = excluded.completed_modules,
                completion_percentage = excluded.completion_percentage,
                video_progress_percentage = COALESCE(
                    excluded.video_progress_percentage,
                    lesson_completions.video_progress_percentage
                ),
                is_completed = excluded.is_completed,
                started_at = COALESCE(
                    MIN(lesson_completions.started_at, excluded.started_at),
                    lesson_completions.started_at,
                    excluded.started_at
                ),
                completed_at = COALESCE(
                    MIN(lesson_completions.completed_at, excluded.completed_at),
                    lesson_completions.completed_at,
                    excluded.completed_at
                )
            ",
        )
        .bind(user_id_to_string(record.user_id()))
        .bind(unit_id_to_i64("lesson_id", record.lesson_id().value())?)
        .bind(i64::from(record.total_modules()))
        .bind(i64::from(record.completed_modules()))
        .bind(f64::from(record.completion_percentage()))
        .bind(record.video_progress_percentage().map(f64::from))
        .bind(i64::from(record.is_completed()))
        .bind(record.started_at())
        .bind(record.completed_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
