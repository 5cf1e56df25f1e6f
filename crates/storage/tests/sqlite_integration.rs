use chrono::Duration;
use academy_core::model::{
    ActivityKind, CompletionStatus, Lesson, LessonId, LessonProgress, LessonSection,
    StudentActivity, StudentId, TutorSessionId,
};
use academy_core::time::fixed_now;
use storage::repository::{
    ActivityRecord, ActivityRepository, LessonRepository, ProgressRecord, ProgressRepository,
    TutorInteractionRecord, TutorInteractionRepository,
};
use storage::sqlite::SqliteRepository;

fn build_progress(student: &str, lesson: &str) -> LessonProgress {
    LessonProgress::start(
        StudentId::new(student).unwrap(),
        LessonId::new(lesson).unwrap(),
        fixed_now(),
    )
}

#[tokio::test]
async fn sqlite_roundtrip_preserves_progress_state() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let mut progress = build_progress("student-1", "lesson-A");
    progress.complete_section(LessonSection::Learn, fixed_now());
    progress.record_execution(Some("NameError: name 'x' is not defined"), fixed_now());
    progress.record_execution(None, fixed_now());
    progress.submit_quiz(85, fixed_now()).unwrap();

    repo.upsert_progress(&ProgressRecord::from_progress(&progress))
        .await
        .unwrap();

    let fetched = repo
        .get_progress(progress.student_id(), progress.lesson_id())
        .await
        .expect("fetch")
        .expect("row exists");
    let restored = fetched.into_progress().expect("valid state");
    assert_eq!(restored, progress);
    assert_eq!(restored.quiz_score(), Some(85));
    assert_eq!(restored.code_executions(), 2);
    assert_eq!(restored.error_count(), 1);
}

#[tokio::test]
async fn sqlite_upsert_overwrites_the_pair_row() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_upsert?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let mut progress = build_progress("student-1", "lesson-A");
    repo.upsert_progress(&ProgressRecord::from_progress(&progress))
        .await
        .unwrap();

    for section in LessonSection::SEQUENCE {
        progress.complete_section(section, fixed_now() + Duration::minutes(1));
    }
    repo.upsert_progress(&ProgressRecord::from_progress(&progress))
        .await
        .unwrap();

    let rows = repo.list_progress().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, CompletionStatus::Completed);
    assert_eq!(rows[0].sections_completed.len(), 4);
}

#[tokio::test]
async fn sqlite_stale_query_respects_the_boundary() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_stale?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let now = fixed_now();

    // Idle for 21 minutes: stuck.
    let mut idle = build_progress("student-1", "lesson-A");
    idle.complete_section(LessonSection::Learn, now - Duration::minutes(21));
    repo.upsert_progress(&ProgressRecord::from_progress(&idle))
        .await
        .unwrap();

    // Idle for exactly 20 minutes: on the boundary, not stuck.
    let mut boundary = build_progress("student-2", "lesson-A");
    boundary.complete_section(LessonSection::Learn, now - Duration::minutes(20));
    repo.upsert_progress(&ProgressRecord::from_progress(&boundary))
        .await
        .unwrap();

    // Long idle but already completed: never stuck.
    let mut done = build_progress("student-3", "lesson-A");
    for section in LessonSection::SEQUENCE {
        done.complete_section(section, now - Duration::hours(2));
    }
    repo.upsert_progress(&ProgressRecord::from_progress(&done))
        .await
        .unwrap();

    let stale = repo
        .stale_in_progress(now - Duration::minutes(20))
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].student_id.as_str(), "student-1");
}

#[tokio::test]
async fn sqlite_needing_help_lists_flagged_rows() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_help?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let mut flagged = build_progress("student-1", "lesson-A");
    flagged.request_help(fixed_now());
    repo.upsert_progress(&ProgressRecord::from_progress(&flagged))
        .await
        .unwrap();

    let calm = build_progress("student-2", "lesson-A");
    repo.upsert_progress(&ProgressRecord::from_progress(&calm))
        .await
        .unwrap();

    let rows = repo.list_needing_help().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].needs_help);
    assert_eq!(rows[0].student_id.as_str(), "student-1");
}

#[tokio::test]
async fn sqlite_supports_lessons_activities_and_interactions() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_feeds?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let lesson = Lesson::new(
        LessonId::new("lesson-A").unwrap(),
        "Variables and You",
        fixed_now(),
    )
    .unwrap();
    repo.upsert_lesson(&lesson).await.unwrap();
    let fetched = repo.get_lesson(lesson.id()).await.unwrap().unwrap();
    assert_eq!(fetched.title(), "Variables and You");
    assert_eq!(repo.list_lessons(10).await.unwrap().len(), 1);

    let student = StudentId::new("student-1").unwrap();
    let first = StudentActivity::new(
        student.clone(),
        lesson.id().clone(),
        ActivityKind::LessonStarted,
        None,
        fixed_now(),
    );
    let second = StudentActivity::new(
        student.clone(),
        lesson.id().clone(),
        ActivityKind::QuizSubmitted,
        Some(r#"{"score":85}"#.to_string()),
        fixed_now() + Duration::minutes(10),
    );
    repo.append_activity(&ActivityRecord::from_activity(&first))
        .await
        .unwrap();
    let id = repo
        .append_activity(&ActivityRecord::from_activity(&second))
        .await
        .unwrap();

    let recent = repo.activities_for_student(&student, 1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, Some(id));
    assert_eq!(recent[0].kind, ActivityKind::QuizSubmitted);
    assert_eq!(recent[0].detail.as_deref(), Some(r#"{"score":85}"#));

    let session = TutorSessionId::random();
    let interaction = TutorInteractionRecord {
        id: None,
        session_id: session,
        student_id: student.clone(),
        lesson_id: lesson.id().clone(),
        message: "what is a variable?".to_string(),
        reply: "A variable is a named box for a value. You fill it with `=`.".to_string(),
        response_kind: "concept_help".to_string(),
        help_level: 1,
        xp_reward: 5,
        occurred_at: fixed_now(),
    };
    repo.append_interaction(&interaction).await.unwrap();

    let exchanges = repo.interactions_for_session(session).await.unwrap();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].session_id, session);
    assert_eq!(exchanges[0].help_level, 1);

    let other = repo
        .interactions_for_session(TutorSessionId::random())
        .await
        .unwrap();
    assert!(other.is_empty());
}
