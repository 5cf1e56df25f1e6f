use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

use academy_core::Clock;
use academy_core::model::{
    ActivityKind, LessonId, LessonProgress, LessonSection, StudentActivity, StudentId,
};
use academy_core::stuck::StuckPolicy;
use storage::repository::{
    ActivityRecord, ActivityRepository, ProgressRecord, ProgressRepository,
};

use super::events::ProgressEvent;
use crate::error::ProgressServiceError;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tracks lesson progress against storage and mirrors it into a read cache.
///
/// Storage is the source of truth. Every write performs one upsert, then a
/// best-effort activity append, then a wholesale cache refresh, then an
/// event broadcast. Reads query storage and fall back to the stale cache
/// only when the query fails, so dashboards keep rendering through backend
/// outages.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    activities: Arc<dyn ActivityRepository>,
    cache: Arc<Mutex<HashMap<(StudentId, LessonId), ProgressRecord>>>,
    events: broadcast::Sender<ProgressEvent>,
    stuck_policy: StuckPolicy,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        activities: Arc<dyn ActivityRepository>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            clock,
            progress,
            activities,
            cache: Arc::new(Mutex::new(HashMap::new())),
            events,
            stuck_policy: StuckPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_stuck_policy(mut self, policy: StuckPolicy) -> Self {
        self.stuck_policy = policy;
        self
    }

    #[must_use]
    pub fn stuck_policy(&self) -> StuckPolicy {
        self.stuck_policy
    }

    /// Subscribe to change notifications. Slow subscribers that fall more
    /// than the channel capacity behind lose the oldest events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    //
    // ─── WRITE PATH ────────────────────────────────────────────────────────
    //

    /// Starts (or restarts) a lesson for a student.
    ///
    /// Idempotent upsert keyed by the pair: restarting resets sections,
    /// errors and the needs-help flag. The old row is overwritten, not
    /// deleted; history survives in the activity feed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the upsert fails.
    pub async fn start_lesson(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let now = self.clock.now();
        let progress = LessonProgress::start(student_id, lesson_id, now);
        self.persist(&progress, ActivityKind::LessonStarted, None)
            .await?;
        Ok(progress)
    }

    /// Records completion of a section for the pair.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotStarted` if the lesson was never
    /// started, or `Storage` if persistence fails.
    pub async fn complete_section(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
        section: LessonSection,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let mut progress = self.load(student_id, lesson_id).await?;
        progress.complete_section(section, self.clock.now());
        let detail = json!({ "section": section.as_str() }).to_string();
        self.persist(&progress, ActivityKind::SectionCompleted, Some(detail))
            .await?;
        Ok(progress)
    }

    /// Records one code execution, failed or clean.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotStarted` if the lesson was never
    /// started, or `Storage` if persistence fails.
    pub async fn execute_code(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
        error: Option<&str>,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let mut progress = self.load(student_id, lesson_id).await?;
        progress.record_execution(error, self.clock.now());
        let detail = error.map(|e| json!({ "error": e }).to_string());
        self.persist(&progress, ActivityKind::CodeExecuted, detail)
            .await?;
        Ok(progress)
    }

    /// Records a quiz submission; the quiz section completes with it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotStarted` if the lesson was never
    /// started, `Progress` for an out-of-range score, or `Storage` if
    /// persistence fails.
    pub async fn submit_quiz(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
        score: u8,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let mut progress = self.load(student_id, lesson_id).await?;
        progress.submit_quiz(score, self.clock.now())?;
        let detail = json!({ "score": score }).to_string();
        self.persist(&progress, ActivityKind::QuizSubmitted, Some(detail))
            .await?;
        Ok(progress)
    }

    /// Flags the pair as needing help.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotStarted` if the lesson was never
    /// started, or `Storage` if persistence fails.
    pub async fn request_help(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let mut progress = self.load(student_id, lesson_id).await?;
        progress.request_help(self.clock.now());
        self.persist(&progress, ActivityKind::HelpRequested, None)
            .await?;
        Ok(progress)
    }

    /// Hands in a completed lesson.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotStarted` if the lesson was never
    /// started, `Progress` if it is not yet completed, or `Storage` if
    /// persistence fails.
    pub async fn submit_lesson(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let mut progress = self.load(student_id, lesson_id).await?;
        progress.mark_submitted(self.clock.now())?;
        self.persist(&progress, ActivityKind::LessonSubmitted, None)
            .await?;
        Ok(progress)
    }

    /// Accumulates time spent on the pair.
    ///
    /// A time heartbeat is not activity: it neither appends to the feed nor
    /// bumps `last_activity`, so idle-but-open lessons still show up as
    /// stuck.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotStarted` if the lesson was never
    /// started, or `Storage` if persistence fails.
    pub async fn record_time(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
        secs: u64,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let mut progress = self.load(student_id, lesson_id).await?;
        progress.add_time(secs);
        self.progress
            .upsert_progress(&ProgressRecord::from_progress(&progress))
            .await?;
        self.refresh_cache().await;
        Ok(progress)
    }

    //
    // ─── READ PATH ─────────────────────────────────────────────────────────
    //

    /// Progress for one pair, if the lesson was ever started.
    ///
    /// Falls back to the stale cache when the query fails.
    pub async fn get_progress(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
    ) -> Option<LessonProgress> {
        match self.progress.get_progress(student_id, lesson_id).await {
            Ok(record) => record.and_then(restore),
            Err(e) => {
                warn!(error = %e, "progress query failed, serving cached value");
                self.cached(|records| {
                    records
                        .get(&(student_id.clone(), lesson_id.clone()))
                        .cloned()
                })
                .and_then(restore)
            }
        }
    }

    /// Every progress row, for teacher dashboards.
    ///
    /// Falls back to the stale cache when the query fails.
    pub async fn all_progress(&self) -> Vec<LessonProgress> {
        match self.progress.list_progress().await {
            Ok(records) => records.into_iter().filter_map(restore).collect(),
            Err(e) => {
                warn!(error = %e, "progress list failed, serving cached values");
                self.cached_rows()
                    .into_iter()
                    .filter_map(restore)
                    .collect()
            }
        }
    }

    /// Pairs currently flagged as needing help.
    ///
    /// Falls back to the stale cache when the query fails.
    pub async fn students_needing_help(&self) -> Vec<LessonProgress> {
        match self.progress.list_needing_help().await {
            Ok(records) => records.into_iter().filter_map(restore).collect(),
            Err(e) => {
                warn!(error = %e, "needs-help query failed, serving cached values");
                self.cached_rows()
                    .into_iter()
                    .filter(|record| record.needs_help)
                    .filter_map(restore)
                    .collect()
            }
        }
    }

    /// In-progress pairs idle past the stuck threshold, oldest first.
    ///
    /// The timestamp comparison runs in the repository at query time; the
    /// cache fallback applies the same policy locally.
    pub async fn stuck_students(&self) -> Vec<LessonProgress> {
        let now = self.clock.now();
        let cutoff = self.stuck_policy.cutoff(now);
        match self.progress.stale_in_progress(cutoff).await {
            Ok(records) => records.into_iter().filter_map(restore).collect(),
            Err(e) => {
                warn!(error = %e, "stuck query failed, serving cached values");
                let mut rows: Vec<ProgressRecord> = self
                    .cached_rows()
                    .into_iter()
                    .filter(|record| {
                        self.stuck_policy
                            .is_stuck(record.status, record.last_activity, now)
                    })
                    .collect();
                rows.sort_by_key(|record| record.last_activity);
                rows.into_iter().filter_map(restore).collect()
            }
        }
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────
    //

    async fn load(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let record = self
            .progress
            .get_progress(student_id, lesson_id)
            .await?
            .ok_or(ProgressServiceError::NotStarted)?;
        Ok(record.into_progress()?)
    }

    async fn persist(
        &self,
        progress: &LessonProgress,
        kind: ActivityKind,
        detail: Option<String>,
    ) -> Result<(), ProgressServiceError> {
        self.progress
            .upsert_progress(&ProgressRecord::from_progress(progress))
            .await?;

        // The activity feed is observability, not state: a failed append
        // must not fail the operation.
        let activity = StudentActivity::new(
            progress.student_id().clone(),
            progress.lesson_id().clone(),
            kind,
            detail,
            self.clock.now(),
        );
        if let Err(e) = self
            .activities
            .append_activity(&ActivityRecord::from_activity(&activity))
            .await
        {
            warn!(error = %e, kind = kind.as_str(), "activity append failed");
        }

        self.refresh_cache().await;

        let _ = self.events.send(ProgressEvent {
            student_id: progress.student_id().clone(),
            lesson_id: progress.lesson_id().clone(),
            kind,
        });
        Ok(())
    }

    /// Wholesale refetch after any write. On failure the previous cache
    /// contents stay in place; stale data is the designed fallback.
    async fn refresh_cache(&self) {
        match self.progress.list_progress().await {
            Ok(records) => {
                let fresh: HashMap<(StudentId, LessonId), ProgressRecord> = records
                    .into_iter()
                    .map(|record| {
                        (
                            (record.student_id.clone(), record.lesson_id.clone()),
                            record,
                        )
                    })
                    .collect();
                if let Ok(mut guard) = self.cache.lock() {
                    *guard = fresh;
                }
            }
            Err(e) => {
                warn!(error = %e, "cache refresh failed, keeping stale entries");
            }
        }
    }

    fn cached<T>(
        &self,
        read: impl FnOnce(&HashMap<(StudentId, LessonId), ProgressRecord>) -> T,
    ) -> T
    where
        T: Default,
    {
        self.cache.lock().map(|guard| read(&guard)).unwrap_or_default()
    }

    fn cached_rows(&self) -> Vec<ProgressRecord> {
        self.cached(|records| records.values().cloned().collect())
    }
}

fn restore(record: ProgressRecord) -> Option<LessonProgress> {
    match record.into_progress() {
        Ok(progress) => Some(progress),
        Err(e) => {
            warn!(error = %e, "dropping progress row with invalid state");
            None
        }
    }
}
