use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{LessonId, StudentId};
use crate::model::lesson::LessonSection;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("quiz score must be at most 100, got {0}")]
    InvalidQuizScore(u8),

    #[error("lesson must be completed before it can be submitted")]
    SubmitBeforeCompleted,

    #[error("invalid persisted progress state: {0}")]
    InvalidPersistedState(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle status of a (student, lesson) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    NotStarted,
    InProgress,
    Completed,
    Submitted,
}

impl CompletionStatus {
    /// Storage token for this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionStatus::NotStarted => "not_started",
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Completed => "completed",
            CompletionStatus::Submitted => "submitted",
        }
    }

    /// Parses a status token.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPersistedState` for unknown tokens.
    pub fn parse(value: &str) -> Result<Self, ProgressError> {
        match value {
            "not_started" => Ok(CompletionStatus::NotStarted),
            "in_progress" => Ok(CompletionStatus::InProgress),
            "completed" => Ok(CompletionStatus::Completed),
            "submitted" => Ok(CompletionStatus::Submitted),
            other => Err(ProgressError::InvalidPersistedState(format!(
                "unknown status: {other}"
            ))),
        }
    }
}

/// Number of recorded errors above which a student is flagged as needing
/// help. The flag flips on the first error past the threshold and stays set
/// until cleared or until the lesson is restarted.
pub const HELP_ERROR_THRESHOLD: usize = 3;

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// Progress of one student through one lesson.
///
/// Created on lesson start, mutated by section-completion, code-execution and
/// quiz-submission events, never deleted. Storage is the source of truth;
/// this type enforces the state invariants:
///
/// - `sections_completed` holds each section at most once, in completion
///   order, drawn from the fixed `Learn → Code → Quiz → Submit` sequence.
/// - `status` is `Completed` exactly when all sections are done.
/// - `Submitted` is only reachable from `Completed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonProgress {
    student_id: StudentId,
    lesson_id: LessonId,
    status: CompletionStatus,
    sections_completed: Vec<LessonSection>,
    current_section: LessonSection,
    code_executions: u32,
    quiz_score: Option<u8>,
    time_spent_secs: u64,
    needs_help: bool,
    help_flagged_at: Option<DateTime<Utc>>,
    errors: Vec<String>,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl LessonProgress {
    /// Starts a fresh progress record for the pair.
    #[must_use]
    pub fn start(student_id: StudentId, lesson_id: LessonId, now: DateTime<Utc>) -> Self {
        Self {
            student_id,
            lesson_id,
            status: CompletionStatus::InProgress,
            sections_completed: Vec::new(),
            current_section: LessonSection::Learn,
            code_executions: 0,
            quiz_score: None,
            time_spent_secs: 0,
            needs_help: false,
            help_flagged_at: None,
            errors: Vec::new(),
            started_at: now,
            last_activity: now,
        }
    }

    /// Rehydrates a progress record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPersistedState` if the stored state
    /// violates the invariants (duplicate sections, status inconsistent with
    /// the section count) and `ProgressError::InvalidQuizScore` for an
    /// out-of-range score.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        student_id: StudentId,
        lesson_id: LessonId,
        status: CompletionStatus,
        sections_completed: Vec<LessonSection>,
        current_section: LessonSection,
        code_executions: u32,
        quiz_score: Option<u8>,
        time_spent_secs: u64,
        needs_help: bool,
        help_flagged_at: Option<DateTime<Utc>>,
        errors: Vec<String>,
        started_at: DateTime<Utc>,
        last_activity: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        for (index, section) in sections_completed.iter().enumerate() {
            if sections_completed[..index].contains(section) {
                return Err(ProgressError::InvalidPersistedState(format!(
                    "duplicate section: {}",
                    section.as_str()
                )));
            }
        }

        if let Some(score) = quiz_score {
            if score > 100 {
                return Err(ProgressError::InvalidQuizScore(score));
            }
        }

        let done = sections_completed.len();
        let consistent = match status {
            CompletionStatus::NotStarted => done == 0,
            CompletionStatus::InProgress => done < LessonSection::TOTAL,
            CompletionStatus::Completed | CompletionStatus::Submitted => {
                done == LessonSection::TOTAL
            }
        };
        if !consistent {
            return Err(ProgressError::InvalidPersistedState(format!(
                "status {} does not match {done} completed sections",
                status.as_str()
            )));
        }

        Ok(Self {
            student_id,
            lesson_id,
            status,
            sections_completed,
            current_section,
            code_executions,
            quiz_score,
            time_spent_secs,
            needs_help,
            help_flagged_at,
            errors,
            started_at,
            last_activity,
        })
    }

    //
    // ─── EVENTS ────────────────────────────────────────────────────────────
    //

    /// Records completion of a section.
    ///
    /// Idempotent: completing an already-completed section leaves the record
    /// unchanged apart from `last_activity` and returns `false`. Once every
    /// section is done the status becomes `Completed`.
    pub fn complete_section(&mut self, section: LessonSection, now: DateTime<Utc>) -> bool {
        self.last_activity = now;
        if self.sections_completed.contains(&section) {
            return false;
        }

        self.sections_completed.push(section);
        self.current_section = self.first_open_section().unwrap_or(LessonSection::Submit);

        if self.sections_completed.len() == LessonSection::TOTAL {
            self.status = CompletionStatus::Completed;
        } else if self.status == CompletionStatus::NotStarted {
            self.status = CompletionStatus::InProgress;
        }
        true
    }

    /// Records one code execution, with the runtime error if it failed.
    ///
    /// The needs-help flag flips once the accumulated error count exceeds
    /// [`HELP_ERROR_THRESHOLD`] and stays set.
    pub fn record_execution(&mut self, error: Option<&str>, now: DateTime<Utc>) {
        self.code_executions = self.code_executions.saturating_add(1);
        self.last_activity = now;

        if let Some(error) = error {
            self.errors.push(error.to_string());
            if self.errors.len() > HELP_ERROR_THRESHOLD && !self.needs_help {
                self.needs_help = true;
                self.help_flagged_at = Some(now);
            }
        }
    }

    /// Records a quiz submission and completes the quiz section.
    ///
    /// A re-submission overwrites the previous score (last write wins, the
    /// same as the backing row).
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidQuizScore` if `score > 100`.
    pub fn submit_quiz(&mut self, score: u8, now: DateTime<Utc>) -> Result<(), ProgressError> {
        if score > 100 {
            return Err(ProgressError::InvalidQuizScore(score));
        }
        self.quiz_score = Some(score);
        self.complete_section(LessonSection::Quiz, now);
        Ok(())
    }

    /// Flags the student as needing help right now.
    pub fn request_help(&mut self, now: DateTime<Utc>) {
        self.needs_help = true;
        self.help_flagged_at = Some(now);
        self.last_activity = now;
    }

    /// Clears the needs-help flag. Accumulated errors remain as audit trail.
    pub fn clear_help(&mut self) {
        self.needs_help = false;
        self.help_flagged_at = None;
    }

    /// Accumulates time spent on the lesson.
    ///
    /// Deliberately does not touch `last_activity`: time heartbeats arrive
    /// while a student may be idle, and counting them as activity would mask
    /// stuck students.
    pub fn add_time(&mut self, secs: u64) {
        self.time_spent_secs = self.time_spent_secs.saturating_add(secs);
    }

    /// Marks the lesson as handed in.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::SubmitBeforeCompleted` unless the lesson is
    /// `Completed`.
    pub fn mark_submitted(&mut self, now: DateTime<Utc>) -> Result<(), ProgressError> {
        if self.status != CompletionStatus::Completed {
            return Err(ProgressError::SubmitBeforeCompleted);
        }
        self.status = CompletionStatus::Submitted;
        self.last_activity = now;
        Ok(())
    }

    fn first_open_section(&self) -> Option<LessonSection> {
        LessonSection::SEQUENCE
            .iter()
            .find(|section| !self.sections_completed.contains(section))
            .copied()
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn student_id(&self) -> &StudentId {
        &self.student_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> &LessonId {
        &self.lesson_id
    }

    #[must_use]
    pub fn status(&self) -> CompletionStatus {
        self.status
    }

    #[must_use]
    pub fn sections_completed(&self) -> &[LessonSection] {
        &self.sections_completed
    }

    #[must_use]
    pub fn current_section(&self) -> LessonSection {
        self.current_section
    }

    #[must_use]
    pub fn code_executions(&self) -> u32 {
        self.code_executions
    }

    #[must_use]
    pub fn quiz_score(&self) -> Option<u8> {
        self.quiz_score
    }

    #[must_use]
    pub fn time_spent_secs(&self) -> u64 {
        self.time_spent_secs
    }

    #[must_use]
    pub fn needs_help(&self) -> bool {
        self.needs_help
    }

    #[must_use]
    pub fn help_flagged_at(&self) -> Option<DateTime<Utc>> {
        self.help_flagged_at
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn start_progress() -> LessonProgress {
        LessonProgress::start(
            StudentId::new("student-1").unwrap(),
            LessonId::new("lesson-A").unwrap(),
            fixed_now(),
        )
    }

    #[test]
    fn completing_all_sections_completes_the_lesson() {
        let mut progress = start_progress();
        assert_eq!(progress.status(), CompletionStatus::InProgress);

        for section in LessonSection::SEQUENCE {
            assert!(progress.complete_section(section, fixed_now()));
        }

        assert_eq!(progress.status(), CompletionStatus::Completed);
        assert_eq!(progress.sections_completed().len(), 4);
    }

    #[test]
    fn completing_a_section_twice_is_a_no_op() {
        let mut progress = start_progress();
        for section in LessonSection::SEQUENCE {
            progress.complete_section(section, fixed_now());
        }

        assert!(!progress.complete_section(LessonSection::Learn, fixed_now()));
        assert_eq!(progress.sections_completed().len(), 4);
        assert_eq!(progress.status(), CompletionStatus::Completed);
    }

    #[test]
    fn not_completed_until_every_section_is_done() {
        let mut progress = start_progress();
        progress.complete_section(LessonSection::Learn, fixed_now());
        progress.complete_section(LessonSection::Code, fixed_now());
        progress.complete_section(LessonSection::Quiz, fixed_now());
        assert_eq!(progress.status(), CompletionStatus::InProgress);

        progress.complete_section(LessonSection::Submit, fixed_now());
        assert_eq!(progress.status(), CompletionStatus::Completed);
    }

    #[test]
    fn current_section_tracks_first_open_section() {
        let mut progress = start_progress();
        assert_eq!(progress.current_section(), LessonSection::Learn);

        progress.complete_section(LessonSection::Learn, fixed_now());
        assert_eq!(progress.current_section(), LessonSection::Code);

        // Completing out of order still points at the earliest open section.
        progress.complete_section(LessonSection::Quiz, fixed_now());
        assert_eq!(progress.current_section(), LessonSection::Code);
    }

    #[test]
    fn help_flag_flips_above_error_threshold_and_sticks() {
        let mut progress = start_progress();
        for _ in 0..HELP_ERROR_THRESHOLD {
            progress.record_execution(Some("NameError: name 'x' is not defined"), fixed_now());
        }
        assert!(!progress.needs_help());

        let flip_at = fixed_now() + Duration::minutes(1);
        progress.record_execution(Some("SyntaxError: invalid syntax"), flip_at);
        assert!(progress.needs_help());
        assert_eq!(progress.help_flagged_at(), Some(flip_at));

        // A clean run afterwards does not unset the flag.
        progress.record_execution(None, flip_at + Duration::minutes(1));
        assert!(progress.needs_help());
        assert_eq!(progress.code_executions(), 5);
    }

    #[test]
    fn clear_help_resets_flag_but_keeps_errors() {
        let mut progress = start_progress();
        progress.request_help(fixed_now());
        progress.record_execution(Some("boom"), fixed_now());
        assert!(progress.needs_help());

        progress.clear_help();
        assert!(!progress.needs_help());
        assert_eq!(progress.help_flagged_at(), None);
        assert_eq!(progress.error_count(), 1);
    }

    #[test]
    fn quiz_submission_validates_score_and_completes_quiz() {
        let mut progress = start_progress();
        assert!(matches!(
            progress.submit_quiz(101, fixed_now()),
            Err(ProgressError::InvalidQuizScore(101))
        ));

        progress.submit_quiz(85, fixed_now()).unwrap();
        assert_eq!(progress.quiz_score(), Some(85));
        assert!(progress
            .sections_completed()
            .contains(&LessonSection::Quiz));

        // Last write wins, matching the backing row semantics.
        progress.submit_quiz(90, fixed_now()).unwrap();
        assert_eq!(progress.quiz_score(), Some(90));
        assert_eq!(
            progress
                .sections_completed()
                .iter()
                .filter(|s| **s == LessonSection::Quiz)
                .count(),
            1
        );
    }

    #[test]
    fn submission_requires_completion() {
        let mut progress = start_progress();
        assert!(matches!(
            progress.mark_submitted(fixed_now()),
            Err(ProgressError::SubmitBeforeCompleted)
        ));

        for section in LessonSection::SEQUENCE {
            progress.complete_section(section, fixed_now());
        }
        progress.mark_submitted(fixed_now()).unwrap();
        assert_eq!(progress.status(), CompletionStatus::Submitted);
    }

    #[test]
    fn add_time_accumulates_without_touching_activity() {
        let mut progress = start_progress();
        let before = progress.last_activity();
        progress.add_time(30);
        progress.add_time(45);
        assert_eq!(progress.time_spent_secs(), 75);
        assert_eq!(progress.last_activity(), before);
    }

    #[test]
    fn from_persisted_rejects_duplicate_sections() {
        let err = LessonProgress::from_persisted(
            StudentId::new("student-1").unwrap(),
            LessonId::new("lesson-A").unwrap(),
            CompletionStatus::InProgress,
            vec![LessonSection::Learn, LessonSection::Learn],
            LessonSection::Code,
            0,
            None,
            0,
            false,
            None,
            Vec::new(),
            fixed_now(),
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidPersistedState(_)));
    }

    #[test]
    fn from_persisted_rejects_status_count_mismatch() {
        let err = LessonProgress::from_persisted(
            StudentId::new("student-1").unwrap(),
            LessonId::new("lesson-A").unwrap(),
            CompletionStatus::Completed,
            vec![LessonSection::Learn],
            LessonSection::Code,
            0,
            None,
            0,
            false,
            None,
            Vec::new(),
            fixed_now(),
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidPersistedState(_)));
    }

    #[test]
    fn status_tokens_roundtrip() {
        for status in [
            CompletionStatus::NotStarted,
            CompletionStatus::InProgress,
            CompletionStatus::Completed,
            CompletionStatus::Submitted,
        ] {
            assert_eq!(CompletionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(CompletionStatus::parse("paused").is_err());
    }
}
