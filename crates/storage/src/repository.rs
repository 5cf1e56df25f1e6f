use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use academy_core::model::{
    ActivityKind, CompletionStatus, Lesson, LessonId, LessonProgress, LessonSection,
    ProgressError, StudentActivity, StudentId, TutorSessionId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Persisted shape for lesson progress.
///
/// Mirrors the domain `LessonProgress` so repositories can serialize and
/// deserialize without leaking storage concerns into the domain layer.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub student_id: StudentId,
    pub lesson_id: LessonId,
    pub status: CompletionStatus,
    pub sections_completed: Vec<LessonSection>,
    pub current_section: LessonSection,
    pub code_executions: u32,
    pub quiz_score: Option<u8>,
    pub time_spent_secs: u64,
    pub needs_help: bool,
    pub help_flagged_at: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ProgressRecord {
    #[must_use]
    pub fn from_progress(progress: &LessonProgress) -> Self {
        Self {
            student_id: progress.student_id().clone(),
            lesson_id: progress.lesson_id().clone(),
            status: progress.status(),
            sections_completed: progress.sections_completed().to_vec(),
            current_section: progress.current_section(),
            code_executions: progress.code_executions(),
            quiz_score: progress.quiz_score(),
            time_spent_secs: progress.time_spent_secs(),
            needs_help: progress.needs_help(),
            help_flagged_at: progress.help_flagged_at(),
            errors: progress.errors().to_vec(),
            started_at: progress.started_at(),
            last_activity: progress.last_activity(),
        }
    }

    /// Convert the record back into domain `LessonProgress`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the stored state violates the domain
    /// invariants.
    pub fn into_progress(self) -> Result<LessonProgress, ProgressError> {
        LessonProgress::from_persisted(
            self.student_id,
            self.lesson_id,
            self.status,
            self.sections_completed,
            self.current_section,
            self.code_executions,
            self.quiz_score,
            self.time_spent_secs,
            self.needs_help,
            self.help_flagged_at,
            self.errors,
            self.started_at,
            self.last_activity,
        )
    }
}

/// Persisted shape for one activity-feed entry.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub id: Option<i64>,
    pub student_id: StudentId,
    pub lesson_id: LessonId,
    pub kind: ActivityKind,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityRecord {
    #[must_use]
    pub fn from_activity(activity: &StudentActivity) -> Self {
        Self {
            id: None,
            student_id: activity.student_id.clone(),
            lesson_id: activity.lesson_id.clone(),
            kind: activity.kind,
            detail: activity.detail.clone(),
            occurred_at: activity.occurred_at,
        }
    }
}

/// Persisted shape for one tutoring exchange.
#[derive(Debug, Clone)]
pub struct TutorInteractionRecord {
    pub id: Option<i64>,
    pub session_id: TutorSessionId,
    pub student_id: StudentId,
    pub lesson_id: LessonId,
    pub message: String,
    pub reply: String,
    pub response_kind: String,
    pub help_level: u8,
    pub xp_reward: u32,
    pub occurred_at: DateTime<Utc>,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Repository contract for lesson progress rows.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist or update the row for a (student, lesson) pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Fetch the row for a pair, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn get_progress(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// All progress rows, ordered by (student, lesson).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn list_progress(&self) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Rows currently flagged as needing help.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn list_needing_help(&self) -> Result<Vec<ProgressRecord>, StorageError>;

    /// In-progress rows whose last activity is strictly before `cutoff`.
    ///
    /// This is the stuck-student query: the threshold arithmetic happens in
    /// the caller, the timestamp comparison here.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn stale_in_progress(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProgressRecord>, StorageError>;
}

/// Repository contract for the append-only activity feed.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Append one entry, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn append_activity(&self, record: &ActivityRecord) -> Result<i64, StorageError>;

    /// Most recent entries for a student, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn activities_for_student(
        &self,
        student_id: &StudentId,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, StorageError>;
}

/// Repository contract for lessons.
#[async_trait]
pub trait LessonRepository: Send + Sync {
    /// Persist or update a lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;

    /// Fetch a lesson by id, if present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn get_lesson(&self, id: &LessonId) -> Result<Option<Lesson>, StorageError>;

    /// Lessons ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn list_lessons(&self, limit: u32) -> Result<Vec<Lesson>, StorageError>;
}

/// Repository contract for tutoring exchanges.
#[async_trait]
pub trait TutorInteractionRepository: Send + Sync {
    /// Append one exchange, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the exchange cannot be stored.
    async fn append_interaction(
        &self,
        record: &TutorInteractionRecord,
    ) -> Result<i64, StorageError>;

    /// All exchanges for a session in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn interactions_for_session(
        &self,
        session_id: TutorSessionId,
    ) -> Result<Vec<TutorInteractionRecord>, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for tests and degraded mode.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(StudentId, LessonId), ProgressRecord>>>,
    activities: Arc<Mutex<Vec<ActivityRecord>>>,
    lessons: Arc<Mutex<HashMap<LessonId, Lesson>>>,
    interactions: Arc<Mutex<Vec<TutorInteractionRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_error)?;
        guard.insert(
            (record.student_id.clone(), record.lesson_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn get_progress(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(lock_error)?;
        Ok(guard
            .get(&(student_id.clone(), lesson_id.clone()))
            .cloned())
    }

    async fn list_progress(&self) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(lock_error)?;
        let mut rows: Vec<ProgressRecord> = guard.values().cloned().collect();
        rows.sort_by(|a, b| {
            (a.student_id.as_str(), a.lesson_id.as_str())
                .cmp(&(b.student_id.as_str(), b.lesson_id.as_str()))
        });
        Ok(rows)
    }

    async fn list_needing_help(&self) -> Result<Vec<ProgressRecord>, StorageError> {
        let mut rows = self.list_progress().await?;
        rows.retain(|row| row.needs_help);
        Ok(rows)
    }

    async fn stale_in_progress(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(lock_error)?;
        let mut rows: Vec<ProgressRecord> = guard
            .values()
            .filter(|row| {
                row.status == CompletionStatus::InProgress && row.last_activity < cutoff
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.last_activity);
        Ok(rows)
    }
}

#[async_trait]
impl ActivityRepository for InMemoryRepository {
    async fn append_activity(&self, record: &ActivityRecord) -> Result<i64, StorageError> {
        let mut guard = self.activities.lock().map_err(lock_error)?;
        let id = guard.len() as i64 + 1;
        let mut stored = record.clone();
        stored.id = Some(id);
        guard.push(stored);
        Ok(id)
    }

    async fn activities_for_student(
        &self,
        student_id: &StudentId,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, StorageError> {
        let guard = self.activities.lock().map_err(lock_error)?;
        let mut rows: Vec<ActivityRecord> = guard
            .iter()
            .filter(|row| &row.student_id == student_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse((row.occurred_at, row.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl LessonRepository for InMemoryRepository {
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut guard = self.lessons.lock().map_err(lock_error)?;
        guard.insert(lesson.id().clone(), lesson.clone());
        Ok(())
    }

    async fn get_lesson(&self, id: &LessonId) -> Result<Option<Lesson>, StorageError> {
        let guard = self.lessons.lock().map_err(lock_error)?;
        Ok(guard.get(id).cloned())
    }

    async fn list_lessons(&self, limit: u32) -> Result<Vec<Lesson>, StorageError> {
        let guard = self.lessons.lock().map_err(lock_error)?;
        let mut rows: Vec<Lesson> = guard.values().cloned().collect();
        rows.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl TutorInteractionRepository for InMemoryRepository {
    async fn append_interaction(
        &self,
        record: &TutorInteractionRecord,
    ) -> Result<i64, StorageError> {
        let mut guard = self.interactions.lock().map_err(lock_error)?;
        let id = guard.len() as i64 + 1;
        let mut stored = record.clone();
        stored.id = Some(id);
        guard.push(stored);
        Ok(id)
    }

    async fn interactions_for_session(
        &self,
        session_id: TutorSessionId,
    ) -> Result<Vec<TutorInteractionRecord>, StorageError> {
        let guard = self.interactions.lock().map_err(lock_error)?;
        Ok(guard
            .iter()
            .filter(|row| row.session_id == session_id)
            .cloned()
            .collect())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub activities: Arc<dyn ActivityRepository>,
    pub lessons: Arc<dyn LessonRepository>,
    pub tutor_interactions: Arc<dyn TutorInteractionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            progress: Arc::new(repo.clone()),
            activities: Arc::new(repo.clone()),
            lessons: Arc::new(repo.clone()),
            tutor_interactions: Arc::new(repo),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use academy_core::stuck::StuckPolicy;
    use academy_core::time::fixed_now;
    use chrono::Duration;

    fn build_progress(student: &str, lesson: &str) -> LessonProgress {
        LessonProgress::start(
            StudentId::new(student).unwrap(),
            LessonId::new(lesson).unwrap(),
            fixed_now(),
        )
    }

    #[tokio::test]
    async fn round_trips_progress_with_sections() {
        let repo = InMemoryRepository::new();
        let mut progress = build_progress("student-1", "lesson-A");
        progress.complete_section(LessonSection::Learn, fixed_now());
        progress.record_execution(Some("NameError: nope"), fixed_now());

        repo.upsert_progress(&ProgressRecord::from_progress(&progress))
            .await
            .unwrap();

        let fetched = repo
            .get_progress(progress.student_id(), progress.lesson_id())
            .await
            .unwrap()
            .expect("row exists");
        let restored = fetched.into_progress().unwrap();
        assert_eq!(restored, progress);
    }

    #[tokio::test]
    async fn stale_query_filters_by_status_and_cutoff() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();

        let mut idle = build_progress("student-1", "lesson-A");
        idle.complete_section(LessonSection::Learn, now - Duration::minutes(30));
        repo.upsert_progress(&ProgressRecord::from_progress(&idle))
            .await
            .unwrap();

        let active = build_progress("student-2", "lesson-A");
        repo.upsert_progress(&ProgressRecord::from_progress(&active))
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
    async fn activity_feed_returns_newest_first() {
        let repo = InMemoryRepository::new();
        let student = StudentId::new("student-1").unwrap();
        let lesson = LessonId::new("lesson-A").unwrap();

        for (minutes, kind) in [
            (0, ActivityKind::LessonStarted),
            (5, ActivityKind::SectionCompleted),
            (9, ActivityKind::CodeExecuted),
        ] {
            let activity = StudentActivity::new(
                student.clone(),
                lesson.clone(),
                kind,
                None,
                fixed_now() + Duration::minutes(minutes),
            );
            repo.append_activity(&ActivityRecord::from_activity(&activity))
                .await
                .unwrap();
        }

        let recent = repo.activities_for_student(&student, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, ActivityKind::CodeExecuted);
        assert_eq!(recent[1].kind, ActivityKind::SectionCompleted);
    }

    #[test]
    fn stale_query_agrees_with_stuck_policy() {
        let policy = StuckPolicy::default();
        let now = fixed_now();
        let cutoff = policy.cutoff(now);

        // The repository filter (`last_activity < cutoff`) and the policy
        // predicate must draw the boundary at the same instant.
        assert!(!policy.is_stuck(CompletionStatus::InProgress, cutoff, now));
        assert!(policy.is_stuck(
            CompletionStatus::InProgress,
            cutoff - Duration::seconds(1),
            now
        ));
    }
}
