use progress_core::model::{CourseId, LessonId, ModuleId};

use super::SqliteRepository;
use super::mapping::{course_id_from_i64, lesson_id_from_i64, module_id_from_i64, ser, unit_id_to_i64};
use crate::repository::{CatalogReader, StorageError};

use sqlx::Row;

#[async_trait::async_trait]
impl CatalogReader for SqliteRepository {
    async fn module_ids_for_lesson(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<ModuleId>, StorageError> {
        let lesson = unit_id_to_i64("lesson_id", lesson_id.value())?;

        let exists = sqlx::query("SELECT 1 FROM lessons WHERE id = ?1")
            .bind(lesson)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let rows = sqlx::query(
            r"
            SELECT id FROM modules
            WHERE lesson_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(lesson)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(module_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?);
        }
        Ok(ids)
    }

    async fn lesson_ids_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<LessonId>, StorageError> {
        let course = unit_id_to_i64("course_id", course_id.value())?;

        let exists = sqlx::query("SELECT 1 FROM courses WHERE id = ?1")
            .bind(course)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let rows = sqlx::query(
            r"
            SELECT id FROM lessons
            WHERE course_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(course)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(lesson_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?);
        }
        Ok(ids)
    }

    async fn lesson_id_for_module(&self, module_id: ModuleId) -> Result<LessonId, StorageError> {
        let row = sqlx::query("SELECT lesson_id FROM modules WHERE id = ?1")
            .bind(unit_id_to_i64("module_id", module_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)
    }

    async fn course_id_for_lesson(&self, lesson_id: LessonId) -> Result<CourseId, StorageError> {
        let row = sqlx::query("SELECT course_id FROM lessons WHERE id = ?1")
            .bind(unit_id_to_i64("lesson_id", lesson_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)
    }
}

/// Catalog writes used by seeding and tests. The engine itself never calls
/// these; the hierarchy is owned by the content-authoring collaborator.
impl SqliteRepository {
    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn insert_course(&self, course_id: CourseId, title: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT OR IGNORE INTO courses (id, title) VALUES (?1, ?2)")
            .bind(unit_id_to_i64("course_id", course_id.value())?)
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn insert_lesson(
        &self,
        course_id: CourseId,
        lesson_id: LessonId,
        title: &str,
        position: u32,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR IGNORE INTO lessons (id, course_id, title, position) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(unit_id_to_i64("lesson_id", lesson_id.value())?)
        .bind(unit_id_to_i64("course_id", course_id.value())?)
        .bind(title)
        .bind(i64::from(position))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn insert_module(
        &self,
        lesson_id: LessonId,
        module_id: ModuleId,
        title: &str,
        position: u32,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR IGNORE INTO modules (id, lesson_id, title, position) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(unit_id_to_i64("module_id", module_id.value())?)
        .bind(unit_id_to_i64("lesson_id", lesson_id.value())?)
        .bind(title)
        .bind(i64::from(position))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
