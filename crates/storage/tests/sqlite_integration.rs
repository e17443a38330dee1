use chrono::Duration;
use progress_core::model::{
    CourseId, CourseProgress, LessonCompletion, LessonId, ModuleCompletion, ModuleId, UserId,
};
use progress_core::time::fixed_now;
use storage::repository::{
    CatalogReader, CourseProgressRepository, LessonProgressRepository, ModuleProgressRepository,
    StorageError,
};
use storage::sqlite::SqliteRepository;

async fn seeded_repo(db: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(db).await.expect("connect");
    repo.migrate().await.expect("migrate");

    repo.insert_course(CourseId::new(1), "Course").await.unwrap();
    repo.insert_lesson(CourseId::new(1), LessonId::new(10), "Lesson 1", 0)
        .await
        .unwrap();
    repo.insert_lesson(CourseId::new(1), LessonId::new(11), "Lesson 2", 1)
        .await
        .unwrap();
    repo.insert_module(LessonId::new(10), ModuleId::new(100), "Module 1.1", 0)
        .await
        .unwrap();
    repo.insert_module(LessonId::new(10), ModuleId::new(101), "Module 1.2", 1)
        .await
        .unwrap();
    repo
}

#[tokio::test]
async fn sqlite_roundtrips_module_completion() {
    let repo = seeded_repo("sqlite:file:memdb_module_roundtrip?mode=memory&cache=shared").await;
    let user = UserId::generate();
    let now = fixed_now();

    let mut record = ModuleCompletion::start(user, ModuleId::new(100), now);
    record.complete(now + Duration::minutes(3));
    repo.upsert_module_completion(&record).await.unwrap();

    let fetched = repo
        .get_module_completion(user, ModuleId::new(100))
        .await
        .expect("fetch")
        .expect("stored");
    assert!(fetched.is_completed());
    assert_eq!(fetched.started_at(), Some(now));
    assert_eq!(fetched.completed_at(), Some(now + Duration::minutes(3)));

    let listed = repo
        .list_module_completions(user, &[ModuleId::new(100), ModuleId::new(101)])
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn sqlite_module_upsert_is_monotonic() {
    let repo = seeded_repo("sqlite:file:memdb_module_monotonic?mode=memory&cache=shared").await;
    let user = UserId::generate();
    let module = ModuleId::new(100);
    let now = fixed_now();

    let mut completed = ModuleCompletion::start(user, module, now);
    completed.complete(now);
    repo.upsert_module_completion(&completed).await.unwrap();

    // Late-arriving write from a racer that never saw the completion.
    let stale = ModuleCompletion::start(user, module, now + Duration::seconds(30));
    repo.upsert_module_completion(&stale).await.unwrap();

    let fetched = repo
        .get_module_completion(user, module)
        .await
        .unwrap()
        .expect("stored");
    assert!(fetched.is_completed());
    assert_eq!(fetched.completed_at(), Some(now));
    assert_eq!(fetched.started_at(), Some(now));
}

#[tokio::test]
async fn sqlite_lesson_upsert_merges_video_and_timestamps() {
    let repo = seeded_repo("sqlite:file:memdb_lesson_merge?mode=memory&cache=shared").await;
    let user = UserId::generate();
    let lesson = LessonId::new(10);
    let now = fixed_now();

    let mut first = LessonCompletion::stub(user, lesson, 2, now);
    first.set_video_progress(55.0);
    first.apply_recount(2, 2, now).unwrap();
    repo.upsert_lesson_completion(&first).await.unwrap();

    let later = now + Duration::minutes(1);
    let mut second = LessonCompletion::stub(user, lesson, 2, later);
    second.apply_recount(2, 2, later).unwrap();
    repo.upsert_lesson_completion(&second).await.unwrap();

    let fetched = repo
        .get_lesson_completion(user, lesson)
        .await
        .unwrap()
        .expect("stored");
    assert_eq!(fetched.completed_at(), Some(now));
    assert_eq!(fetched.started_at(), Some(now));
    assert_eq!(fetched.video_progress_percentage(), Some(55.0));
    assert_eq!(fetched.completion_percentage(), 100.0);
}

#[tokio::test]
async fn sqlite_course_progress_listing_is_ordered() {
    let repo = seeded_repo("sqlite:file:memdb_course_list?mode=memory&cache=shared").await;
    repo.insert_course(CourseId::new(2), "Second").await.unwrap();
    let user = UserId::generate();
    let now = fixed_now();

    repo.upsert_course_progress(&CourseProgress::enroll(user, CourseId::new(2), 0, now))
        .await
        .unwrap();
    repo.upsert_course_progress(&CourseProgress::enroll(user, CourseId::new(1), 2, now))
        .await
        .unwrap();

    let listed = repo.list_course_progress(user).await.unwrap();
    let ids: Vec<u64> = listed.iter().map(|p| p.course_id().value()).collect();
    assert_eq!(ids, vec![1, 2]);

    // Re-enrollment keeps the original timestamp.
    let again = CourseProgress::enroll(user, CourseId::new(1), 2, now + Duration::days(1));
    repo.upsert_course_progress(&again).await.unwrap();
    let fetched = repo
        .get_course_progress(user, CourseId::new(1))
        .await
        .unwrap()
        .expect("stored");
    assert_eq!(fetched.enrolled_at(), now);
}

#[tokio::test]
async fn sqlite_catalog_routes_hierarchy() {
    let repo = seeded_repo("sqlite:file:memdb_catalog?mode=memory&cache=shared").await;

    let modules = repo.module_ids_for_lesson(LessonId::new(10)).await.unwrap();
    assert_eq!(modules, vec![ModuleId::new(100), ModuleId::new(101)]);

    let lessons = repo.lesson_ids_for_course(CourseId::new(1)).await.unwrap();
    assert_eq!(lessons, vec![LessonId::new(10), LessonId::new(11)]);

    assert_eq!(
        repo.lesson_id_for_module(ModuleId::new(101)).await.unwrap(),
        LessonId::new(10)
    );
    assert_eq!(
        repo.course_id_for_lesson(LessonId::new(11)).await.unwrap(),
        CourseId::new(1)
    );

    // An empty lesson is a valid lesson, not an error.
    let empty = repo.module_ids_for_lesson(LessonId::new(11)).await.unwrap();
    assert!(empty.is_empty());

    assert!(matches!(
        repo.module_ids_for_lesson(LessonId::new(999)).await,
        Err(StorageError::NotFound)
    ));
    assert!(matches!(
        repo.lesson_id_for_module(ModuleId::new(999)).await,
        Err(StorageError::NotFound)
    ));
}
