use academy_core::model::{
    ActivityKind, CompletionStatus, Lesson, LessonId, LessonSection, StudentId, TutorSessionId,
};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::{
    ActivityRecord, ProgressRecord, StorageError, TutorInteractionRecord,
};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn student_id_from_str(raw: &str) -> Result<StudentId, StorageError> {
    StudentId::new(raw).map_err(ser)
}

pub(crate) fn lesson_id_from_str(raw: &str) -> Result<LessonId, StorageError> {
    LessonId::new(raw).map_err(ser)
}

/// Encodes the completed-section list as a comma-joined token string.
/// Tokens come from `LessonSection::as_str` and never contain commas.
pub(crate) fn sections_to_text(sections: &[LessonSection]) -> String {
    sections
        .iter()
        .map(|section| section.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Decodes a comma-joined section token string. Must stay consistent with
/// `sections_to_text`.
pub(crate) fn sections_from_text(raw: &str) -> Result<Vec<LessonSection>, StorageError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|token| LessonSection::parse(token).map_err(ser))
        .collect()
}

/// Error strings are arbitrary text, so they are stored as a JSON array.
pub(crate) fn errors_to_json(errors: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(errors).map_err(ser)
}

pub(crate) fn errors_from_json(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn quiz_score_to_i64(score: Option<u8>) -> Option<i64> {
    score.map(i64::from)
}

pub(crate) fn quiz_score_from_i64(value: Option<i64>) -> Result<Option<u8>, StorageError> {
    value
        .map(|v| {
            u8::try_from(v)
                .map_err(|_| StorageError::Serialization(format!("invalid quiz_score: {v}")))
        })
        .transpose()
}

pub(crate) fn map_progress_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProgressRecord, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    let status = CompletionStatus::parse(&status_str).map_err(ser)?;

    let sections_str: String = row.try_get("sections_completed").map_err(ser)?;
    let current_str: String = row.try_get("current_section").map_err(ser)?;

    let code_executions_i64: i64 = row.try_get("code_executions").map_err(ser)?;
    let code_executions = u32::try_from(code_executions_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid code_executions: {code_executions_i64}"))
    })?;

    let time_spent_i64: i64 = row.try_get("time_spent_secs").map_err(ser)?;
    let time_spent_secs = u64::try_from(time_spent_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid time_spent_secs: {time_spent_i64}"))
    })?;

    let errors_str: String = row.try_get("errors").map_err(ser)?;

    Ok(ProgressRecord {
        student_id: student_id_from_str(&row.try_get::<String, _>("student_id").map_err(ser)?)?,
        lesson_id: lesson_id_from_str(&row.try_get::<String, _>("lesson_id").map_err(ser)?)?,
        status,
        sections_completed: sections_from_text(&sections_str)?,
        current_section: LessonSection::parse(&current_str).map_err(ser)?,
        code_executions,
        quiz_score: quiz_score_from_i64(row.try_get("quiz_score").map_err(ser)?)?,
        time_spent_secs,
        needs_help: row.try_get("needs_help").map_err(ser)?,
        help_flagged_at: row.try_get("help_flagged_at").map_err(ser)?,
        errors: errors_from_json(&errors_str)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        last_activity: row.try_get("last_activity").map_err(ser)?,
    })
}

pub(crate) fn map_activity_row(row: &sqlx::sqlite::SqliteRow) -> Result<ActivityRecord, StorageError> {
    let kind_str: String = row.try_get("kind").map_err(ser)?;

    Ok(ActivityRecord {
        id: Some(row.try_get("id").map_err(ser)?),
        student_id: student_id_from_str(&row.try_get::<String, _>("student_id").map_err(ser)?)?,
        lesson_id: lesson_id_from_str(&row.try_get::<String, _>("lesson_id").map_err(ser)?)?,
        kind: ActivityKind::parse(&kind_str).map_err(ser)?,
        detail: row.try_get("detail").map_err(ser)?,
        occurred_at: row.try_get("occurred_at").map_err(ser)?,
    })
}

pub(crate) fn map_lesson_row(row: &sqlx::sqlite::SqliteRow) -> Result<Lesson, StorageError> {
    let id = lesson_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?;
    let title: String = row.try_get("title").map_err(ser)?;
    let created_at = row.try_get("created_at").map_err(ser)?;
    Lesson::new(id, title, created_at).map_err(ser)
}

pub(crate) fn map_interaction_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<TutorInteractionRecord, StorageError> {
    let session_uuid: Uuid = row.try_get("session_id").map_err(ser)?;
    let help_level_i64: i64 = row.try_get("help_level").map_err(ser)?;
    let help_level = u8::try_from(help_level_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid help_level: {help_level_i64}"))
    })?;
    let xp_i64: i64 = row.try_get("xp_reward").map_err(ser)?;
    let xp_reward = u32::try_from(xp_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid xp_reward: {xp_i64}")))?;

    Ok(TutorInteractionRecord {
        id: Some(row.try_get("id").map_err(ser)?),
        session_id: TutorSessionId::from_uuid(session_uuid),
        student_id: student_id_from_str(&row.try_get::<String, _>("student_id").map_err(ser)?)?,
        lesson_id: lesson_id_from_str(&row.try_get::<String, _>("lesson_id").map_err(ser)?)?,
        message: row.try_get("message").map_err(ser)?,
        reply: row.try_get("reply").map_err(ser)?,
        response_kind: row.try_get("response_kind").map_err(ser)?,
        help_level,
        xp_reward,
        occurred_at: row.try_get("occurred_at").map_err(ser)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_text_roundtrip() {
        let sections = vec![LessonSection::Learn, LessonSection::Quiz];
        let text = sections_to_text(&sections);
        assert_eq!(text, "learn,quiz");
        assert_eq!(sections_from_text(&text).unwrap(), sections);
        assert!(sections_from_text("").unwrap().is_empty());
        assert!(sections_from_text("learn,bonus").is_err());
    }

    #[test]
    fn errors_json_roundtrip() {
        let errors = vec![
            "NameError: name 'x' is not defined".to_string(),
            "weird, text with commas".to_string(),
        ];
        let json = errors_to_json(&errors).unwrap();
        assert_eq!(errors_from_json(&json).unwrap(), errors);
    }

    #[test]
    fn quiz_score_conversion_bounds() {
        assert_eq!(quiz_score_from_i64(Some(85)).unwrap(), Some(85));
        assert_eq!(quiz_score_from_i64(None).unwrap(), None);
        assert!(quiz_score_from_i64(Some(-1)).is_err());
        assert_eq!(quiz_score_to_i64(Some(100)), Some(100));
    }
}
