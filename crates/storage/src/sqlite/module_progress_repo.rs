use progress_core::model::{ModuleCompletion, ModuleId, UserId};

use super::SqliteRepository;
use super::mapping::{map_module_completion_row, unit_id_to_i64, user_id_to_string};
use crate::repository::{ModuleProgressRepository, StorageError};

#[async_trait::async_trait]
impl ModuleProgressRepository for SqliteRepository {
    async fn get_module_completion(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<ModuleCompletion>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, module_id, started_at, completed_at, is_completed
            FROM module_completions
            WHERE user_id = ?1 AND module_id = ?2
            ",
        )
        .bind(user_id_to_string(user_id))
        .bind(unit_id_to_i64("module_id", module_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_module_completion_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn list_module_completions(
        &self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<ModuleCompletion>, StorageError> {
        if module_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT user_id, module_id, started_at, completed_at, is_completed
            FROM module_completions
            WHERE user_id = ?1 AND module_id IN (
            ",
        );

        for i in 0..module_ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql).bind(user_id_to_string(user_id));
        for id in module_ids {
            q = q.bind(unit_id_to_i64("module_id", id.value())?);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(map_module_completion_row(&row)?);
        }
        Ok(records)
    }

    async fn upsert_module_completion(
        &self,
        record: &ModuleCompletion,
    ) -> Result<(), StorageError> {
        // Monotonic merge: completion can only latch on, timestamps keep
        // the earliest writer. RFC 3339 text compares chronologically.
        sqlx::query(
            r"
            INSERT INTO module_completions (user_id, module_id, started_at, completed_at, is_completed)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, module_id) DO UPDATE SET
                started_at = COALESCE(
                    MIN(module_completions.started_at, excluded.started_at),
                    module_completions.started_at,
                    excluded.started_at
                ),
                completed_at = COALESCE(
                    MIN(module_completions.completed_at, excluded.completed_at),
                    module_completions.completed_at,
                    excluded.completed_at
                ),
                is_completed = MAX(module_completions.is_completed, excluded.is_completed)
            ",
        )
        .bind(user_id_to_string(record.user_id()))
        .bind(unit_id_to_i64("module_id", record.module_id().value())?)
        .bind(record.started_at())
        .bind(record.completed_at())
        .bind(i64::from(record.is_completed()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
