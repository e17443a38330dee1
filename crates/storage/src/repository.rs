use async_trait::async_trait;
use progress_core::model::{
    CourseId, CourseProgress, LessonCompletion, LessonId, ModuleCompletion, ModuleId, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Repository contract for per-(user, module) completion records.
///
/// Upserts are **monotonic merges**: when a row already exists, the backend
/// keeps the earliest `started_at`/`completed_at` and never lets a write
/// clear a completion flag that another writer has already set. This is the
/// storage-layer half of the race-safety contract: concurrent recomputes
/// may interleave arbitrarily, but a stale write cannot un-complete a
/// record or move its timestamps.
#[async_trait]
pub trait ModuleProgressRepository: Send + Sync {
    /// Fetch one record, `None` if the pair has never produced a fact.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn get_module_completion(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<ModuleCompletion>, StorageError>;

    /// Fetch the records that exist among the given module ids.
    ///
    /// Missing records are simply absent from the result; absence means
    /// "not started" and is never an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn list_module_completions(
        &self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<ModuleCompletion>, StorageError>;

    /// Persist a record, merging monotonically with any existing row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_module_completion(
        &self,
        record: &ModuleCompletion,
    ) -> Result<(), StorageError>;
}

/// Repository contract for per-(user, lesson) completion records.
///
/// Counts and percentages always take the newest write (every recompute
/// re-derives them from source facts); timestamps merge keep-earliest, and
/// a stored video-progress signal is never clobbered by a write that does
/// not carry one.
#[async_trait]
pub trait LessonProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn get_lesson_completion(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, StorageError>;

    /// Fetch the records that exist among the given lesson ids.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn list_lesson_completions(
        &self,
        user_id: UserId,
        lesson_ids: &[LessonId],
    ) -> Result<Vec<LessonCompletion>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_lesson_completion(
        &self,
        record: &LessonCompletion,
    ) -> Result<(), StorageError>;
}

/// Repository contract for per-(user, course) progress records.
#[async_trait]
pub trait CourseProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError>;

    /// All of a user's enrollments, ordered by course id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn list_course_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CourseProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_course_progress(&self, record: &CourseProgress) -> Result<(), StorageError>;
}

/// Read-only view of the content hierarchy, owned by an external catalog
/// collaborator. The engine re-reads membership on every recompute; it
/// never caches or mutates it.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown lesson.
    async fn module_ids_for_lesson(&self, lesson_id: LessonId)
    -> Result<Vec<ModuleId>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown course.
    async fn lesson_ids_for_course(&self, course_id: CourseId)
    -> Result<Vec<LessonId>, StorageError>;

    /// Routes a module fact to its owning lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown module.
    async fn lesson_id_for_module(&self, module_id: ModuleId) -> Result<LessonId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown lesson.
    async fn course_id_for_lesson(&self, lesson_id: LessonId) -> Result<CourseId, StorageError>;
}

//
// ─── MONOTONIC MERGE ───────────────────────────────────────────────────────────
//

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn earliest(
    a: Option<chrono::DateTime<chrono::Utc>>,
    b: Option<chrono::DateTime<chrono::Utc>>,
) -> Option<chrono::DateTime<chrono::Utc>> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

/// Module completion is monotonic at the record level, so the merged row
/// takes the OR of the completion flags and the earliest timestamps.
pub(crate) fn merge_module(
    existing: &ModuleCompletion,
    incoming: &ModuleCompletion,
) -> Result<ModuleCompletion, StorageError> {
    let is_completed = existing.is_completed() || incoming.is_completed();
    let completed_at = earliest(existing.completed_at(), incoming.completed_at());
    let started_at = earliest(existing.started_at(), incoming.started_at());

    ModuleCompletion::from_persisted(
        incoming.user_id(),
        incoming.module_id(),
        started_at,
        completed_at,
        is_completed,
    )
    .map_err(ser)
}

/// Lesson counts are recompute-derived and take the incoming values (the
/// flag may legitimately drop on catalog growth); timestamps keep-earliest;
/// the video signal survives writes that do not carry one.
pub(crate) fn merge_lesson(
    existing: &LessonCompletion,
    incoming: &LessonCompletion,
) -> Result<LessonCompletion, StorageError> {
    LessonCompletion::from_persisted(
        incoming.user_id(),
        incoming.lesson_id(),
        incoming.total_modules(),
        incoming.completed_modules(),
        incoming.completion_percentage(),
        incoming
            .video_progress_percentage()
            .or(existing.video_progress_percentage()),
        incoming.is_completed(),
        earliest(existing.started_at(), incoming.started_at()),
        earliest(existing.completed_at(), incoming.completed_at()),
    )
    .map_err(ser)
}

pub(crate) fn merge_course(
    existing: &CourseProgress,
    incoming: &CourseProgress,
) -> Result<CourseProgress, StorageError> {
    CourseProgress::from_persisted(
        incoming.user_id(),
        incoming.course_id(),
        incoming.total_lessons(),
        incoming.completed_lessons(),
        incoming.progress_percentage(),
        existing.enrolled_at().min(incoming.enrolled_at()),
        incoming.is_completed(),
        earliest(existing.completed_at(), incoming.completed_at()),
    )
    .map_err(ser)
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct CatalogMap {
    lessons_by_course: HashMap<CourseId, Vec<LessonId>>,
    modules_by_lesson: HashMap<LessonId, Vec<ModuleId>>,
    course_by_lesson: HashMap<LessonId, CourseId>,
    lesson_by_module: HashMap<ModuleId, LessonId>,
}

/// Simple in-memory backend for testing and prototyping.
///
/// Completion maps implement the same monotonic-merge upserts as the SQLite
/// backend; the catalog maps are seeded through the `add_*` helpers, which
/// stand in for the external catalog collaborator.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    modules: Arc<Mutex<HashMap<(UserId, ModuleId), ModuleCompletion>>>,
    lessons: Arc<Mutex<HashMap<(UserId, LessonId), LessonCompletion>>>,
    courses: Arc<Mutex<HashMap<(UserId, CourseId), CourseProgress>>>,
    catalog: Arc<Mutex<CatalogMap>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a course in the catalog.
    ///
    /// # Panics
    ///
    /// Panics if the catalog lock is poisoned.
    pub fn add_course(&self, course_id: CourseId) {
        let mut catalog = self.catalog.lock().expect("catalog lock");
        catalog.lessons_by_course.entry(course_id).or_default();
    }

    /// Registers a lesson under a course.
    ///
    /// # Panics
    ///
    /// Panics if the catalog lock is poisoned.
    pub fn add_lesson(&self, course_id: CourseId, lesson_id: LessonId) {
        let mut catalog = self.catalog.lock().expect("catalog lock");
        catalog
            .lessons_by_course
            .entry(course_id)
            .or_default()
            .push(lesson_id);
        catalog.course_by_lesson.insert(lesson_id, course_id);
        catalog.modules_by_lesson.entry(lesson_id).or_default();
    }

    /// Registers a module under a lesson. Calling this against a lesson a
    /// user has already completed models catalog membership growth.
    ///
    /// # Panics
    ///
    /// Panics if the catalog lock is poisoned.
    pub fn add_module(&self, lesson_id: LessonId, module_id: ModuleId) {
        let mut catalog = self.catalog.lock().expect("catalog lock");
        catalog
            .modules_by_lesson
            .entry(lesson_id)
            .or_default()
            .push(module_id);
        catalog.lesson_by_module.insert(module_id, lesson_id);
    }
}

#[async_trait]
impl ModuleProgressRepository for InMemoryRepository {
    async fn get_module_completion(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<ModuleCompletion>, StorageError> {
        let guard = self
            .modules
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(user_id, module_id)).cloned())
    }

    async fn list_module_completions(
        &self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<ModuleCompletion>, StorageError> {
        let guard = self
            .modules
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(module_ids
            .iter()
            .filter_map(|id| guard.get(&(user_id, *id)).cloned())
            .collect())
    }

    async fn upsert_module_completion(
        &self,
        record: &ModuleCompletion,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .modules
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = (record.user_id(), record.module_id());
        let merged = match guard.get(&key) {
            Some(existing) => merge_module(existing, record)?,
            None => record.clone(),
        };
        guard.insert(key, merged);
        Ok(())
    }
}

#[async_trait]
impl LessonProgressRepository for InMemoryRepository {
    async fn get_lesson_completion(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, StorageError> {
        let guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(user_id, lesson_id)).cloned())
    }

    async fn list_lesson_completions(
        &self,
        user_id: UserId,
        lesson_ids: &[LessonId],
    ) -> Result<Vec<LessonCompletion>, StorageError> {
        let guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(lesson_ids
            .iter()
            .filter_map(|id| guard.get(&(user_id, *id)).cloned())
            .collect())
    }

    async fn upsert_lesson_completion(
        &self,
        record: &LessonCompletion,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = (record.user_id(), record.lesson_id());
        let merged = match guard.get(&key) {
            Some(existing) => merge_lesson(existing, record)?,
            None => record.clone(),
        };
        guard.insert(key, merged);
        Ok(())
    }
}

#[async_trait]
impl CourseProgressRepository for InMemoryRepository {
    async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(user_id, course_id)).cloned())
    }

    async fn list_course_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CourseProgress>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut enrollments: Vec<CourseProgress> = guard
            .iter()
            .filter(|((user, _), _)| *user == user_id)
            .map(|(_, progress)| progress.clone())
            .collect();
        enrollments.sort_by_key(|p| p.course_id());
        Ok(enrollments)
    }

    async fn upsert_course_progress(&self, record: &CourseProgress) -> Result<(), StorageError> {
        let mut guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = (record.user_id(), record.course_id());
        let merged = match guard.get(&key) {
            Some(existing) => merge_course(existing, record)?,
            None => record.clone(),
        };
        guard.insert(key, merged);
        Ok(())
    }
}

#[async_trait]
impl CatalogReader for InMemoryRepository {
    async fn module_ids_for_lesson(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<ModuleId>, StorageError> {
        let guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .modules_by_lesson
            .get(&lesson_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn lesson_ids_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<LessonId>, StorageError> {
        let guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .lessons_by_course
            .get(&course_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn lesson_id_for_module(&self, module_id: ModuleId) -> Result<LessonId, StorageError> {
        let guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .lesson_by_module
            .get(&module_id)
            .copied()
            .ok_or(StorageError::NotFound)
    }

    async fn course_id_for_lesson(&self, lesson_id: LessonId) -> Result<CourseId, StorageError> {
        let guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .course_by_lesson
            .get(&lesson_id)
            .copied()
            .ok_or(StorageError::NotFound)
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub modules: Arc<dyn ModuleProgressRepository>,
    pub lessons: Arc<dyn LessonProgressRepository>,
    pub courses: Arc<dyn CourseProgressRepository>,
    pub catalog: Arc<dyn CatalogReader>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryRepository::new())
    }

    /// Build a `Storage` over an existing in-memory backend, so tests can
    /// keep a handle for catalog seeding.
    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        let modules: Arc<dyn ModuleProgressRepository> = Arc::new(repo.clone());
        let lessons: Arc<dyn LessonProgressRepository> = Arc::new(repo.clone());
        let courses: Arc<dyn CourseProgressRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CatalogReader> = Arc::new(repo);
        Self {
            modules,
            lessons,
            courses,
            catalog,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::time::fixed_now;

    fn seeded() -> (InMemoryRepository, UserId) {
        let repo = InMemoryRepository::new();
        repo.add_course(CourseId::new(1));
        repo.add_lesson(CourseId::new(1), LessonId::new(10));
        repo.add_module(LessonId::new(10), ModuleId::new(100));
        repo.add_module(LessonId::new(10), ModuleId::new(101));
        (repo, UserId::generate())
    }

    #[tokio::test]
    async fn round_trips_module_completion() {
        let (repo, user) = seeded();
        let now = fixed_now();

        let mut record = ModuleCompletion::start(user, ModuleId::new(100), now);
        record.complete(now);
        repo.upsert_module_completion(&record).await.unwrap();

        let fetched = repo
            .get_module_completion(user, ModuleId::new(100))
            .await
            .unwrap()
            .expect("record stored");
        assert!(fetched.is_completed());
        assert_eq!(fetched.completed_at(), Some(now));
    }

    #[tokio::test]
    async fn list_skips_missing_records() {
        let (repo, user) = seeded();
        let now = fixed_now();

        let record = ModuleCompletion::start(user, ModuleId::new(100), now);
        repo.upsert_module_completion(&record).await.unwrap();

        let listed = repo
            .list_module_completions(user, &[ModuleId::new(100), ModuleId::new(101)])
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].module_id(), ModuleId::new(100));
    }

    #[tokio::test]
    async fn module_upsert_cannot_revert_completion() {
        let (repo, user) = seeded();
        let module = ModuleId::new(100);
        let now = fixed_now();

        let mut completed = ModuleCompletion::start(user, module, now);
        completed.complete(now);
        repo.upsert_module_completion(&completed).await.unwrap();

        // A racing "started" write that read the pre-completion state lands
        // late; the merge must keep the completion.
        let stale = ModuleCompletion::start(user, module, now + chrono::Duration::seconds(1));
        repo.upsert_module_completion(&stale).await.unwrap();

        let fetched = repo
            .get_module_completion(user, module)
            .await
            .unwrap()
            .expect("record stored");
        assert!(fetched.is_completed());
        assert_eq!(fetched.completed_at(), Some(now));
        assert_eq!(fetched.started_at(), Some(now));
    }

    #[tokio::test]
    async fn lesson_upsert_keeps_earliest_completion_and_video_signal() {
        let (repo, user) = seeded();
        let lesson = LessonId::new(10);
        let now = fixed_now();

        let mut first = LessonCompletion::stub(user, lesson, 2, now);
        first.set_video_progress(40.0);
        first.apply_recount(2, 2, now).unwrap();
        repo.upsert_lesson_completion(&first).await.unwrap();

        // Recompute written by a second worker that loaded the row before
        // the video signal was stored.
        let later = now + chrono::Duration::minutes(2);
        let mut second = LessonCompletion::stub(user, lesson, 2, later);
        second.apply_recount(2, 2, later).unwrap();
        repo.upsert_lesson_completion(&second).await.unwrap();

        let fetched = repo
            .get_lesson_completion(user, lesson)
            .await
            .unwrap()
            .expect("record stored");
        assert_eq!(fetched.completed_at(), Some(now));
        assert_eq!(fetched.started_at(), Some(now));
        assert_eq!(fetched.video_progress_percentage(), Some(40.0));
    }

    #[tokio::test]
    async fn course_listing_is_per_user_and_ordered() {
        let (repo, user) = seeded();
        let other = UserId::generate();
        let now = fixed_now();

        repo.upsert_course_progress(&CourseProgress::enroll(user, CourseId::new(2), 1, now))
            .await
            .unwrap();
        repo.upsert_course_progress(&CourseProgress::enroll(user, CourseId::new(1), 1, now))
            .await
            .unwrap();
        repo.upsert_course_progress(&CourseProgress::enroll(other, CourseId::new(3), 1, now))
            .await
            .unwrap();

        let listed = repo.list_course_progress(user).await.unwrap();
        let ids: Vec<u64> = listed.iter().map(|p| p.course_id().value()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn catalog_queries_route_and_reject_unknown_ids() {
        let (repo, _) = seeded();

        assert_eq!(
            repo.lesson_id_for_module(ModuleId::new(100)).await.unwrap(),
            LessonId::new(10)
        );
        assert_eq!(
            repo.course_id_for_lesson(LessonId::new(10)).await.unwrap(),
            CourseId::new(1)
        );
        assert_eq!(
            repo.module_ids_for_lesson(LessonId::new(10))
                .await
                .unwrap()
                .len(),
            2
        );

        assert!(matches!(
            repo.lesson_id_for_module(ModuleId::new(999)).await,
            Err(StorageError::NotFound)
        ));
        assert!(matches!(
            repo.lesson_ids_for_course(CourseId::new(999)).await,
            Err(StorageError::NotFound)
        ));
    }
}
