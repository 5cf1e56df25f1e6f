use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{LessonId, StudentId};

/// Errors that can occur while decoding activity data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActivityError {
    #[error("unknown activity kind: {0}")]
    UnknownKind(String),
}

/// What a student did, as recorded in the activity feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    LessonStarted,
    SectionCompleted,
    CodeExecuted,
    QuizSubmitted,
    HelpRequested,
    LessonSubmitted,
}

impl ActivityKind {
    /// Storage token for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::LessonStarted => "lesson_started",
            ActivityKind::SectionCompleted => "section_completed",
            ActivityKind::CodeExecuted => "code_executed",
            ActivityKind::QuizSubmitted => "quiz_submitted",
            ActivityKind::HelpRequested => "help_requested",
            ActivityKind::LessonSubmitted => "lesson_submitted",
        }
    }

    /// Parses a kind token.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError::UnknownKind` for unrecognized tokens.
    pub fn parse(value: &str) -> Result<Self, ActivityError> {
        match value {
            "lesson_started" => Ok(ActivityKind::LessonStarted),
            "section_completed" => Ok(ActivityKind::SectionCompleted),
            "code_executed" => Ok(ActivityKind::CodeExecuted),
            "quiz_submitted" => Ok(ActivityKind::QuizSubmitted),
            "help_requested" => Ok(ActivityKind::HelpRequested),
            "lesson_submitted" => Ok(ActivityKind::LessonSubmitted),
            other => Err(ActivityError::UnknownKind(other.to_string())),
        }
    }
}

/// One entry in the append-only activity feed.
///
/// Activities carry no invariants beyond insertion order; they exist for
/// teacher dashboards and audit, not for reconstructing progress state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentActivity {
    pub student_id: StudentId,
    pub lesson_id: LessonId,
    pub kind: ActivityKind,
    /// Optional JSON payload, e.g. the completed section or a quiz score.
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl StudentActivity {
    #[must_use]
    pub fn new(
        student_id: StudentId,
        lesson_id: LessonId,
        kind: ActivityKind,
        detail: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            student_id,
            lesson_id,
            kind,
            detail,
            occurred_at,
        }
    }
}
