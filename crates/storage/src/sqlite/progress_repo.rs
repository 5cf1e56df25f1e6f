use chrono::{DateTime, Utc};

use academy_core::model::{CompletionStatus, LessonId, StudentId};

use super::SqliteRepository;
use super::mapping::{
    errors_to_json, map_progress_row, quiz_score_to_i64, sections_to_text,
};
use crate::repository::{ProgressRecord, ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let time_spent = i64::try_from(record.time_spent_secs)
            .map_err(|_| StorageError::Serialization("time_spent_secs overflow".into()))?;

        sqlx::query(
            r"
            INSERT INTO student_progress (
                student_id, lesson_id, status, sections_completed, current_section,
                code_executions, quiz_score, time_spent_secs, needs_help,
                help_flagged_at, errors, started_at, last_activity
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(student_id, lesson_id) DO UPDATE SET
                -- the caller's record is authoritative, started_at included:
                -- a lesson restart resets the pair
                status = excluded.status,
                sections_completed = excluded.sections_completed,
                current_section = excluded.current_section,
                code_executions = excluded.code_executions,
                quiz_score = excluded.quiz_score,
                time_spent_secs = excluded.time_spent_secs,
                needs_help = excluded.needs_help,
                help_flagged_at = excluded.help_flagged_at,
                errors = excluded.errors,
                started_at = excluded.started_at,
                last_activity = excluded.last_activity
            ",
        )
        .bind(record.student_id.as_str())
        .bind(record.lesson_id.as_str())
        .bind(record.status.as_str())
        .bind(sections_to_text(&record.sections_completed))
        .bind(record.current_section.as_str())
        .bind(i64::from(record.code_executions))
        .bind(quiz_score_to_i64(record.quiz_score))
        .bind(time_spent)
        .bind(record.needs_help)
        .bind(record.help_flagged_at)
        .bind(errors_to_json(&record.errors)?)
        .bind(record.started_at)
        .bind(record.last_activity)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_progress(
        &self,
        student_id: &StudentId,
        lesson_id: &LessonId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                student_id, lesson_id, status, sections_completed, current_section,
                code_executions, quiz_score, time_spent_secs, needs_help,
                help_flagged_at, errors, started_at, last_activity
            FROM student_progress
            WHERE student_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(student_id.as_str())
        .bind(lesson_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn list_progress(&self) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                student_id, lesson_id, status, sections_completed, current_section,
                code_executions, quiz_score, time_spent_secs, needs_help,
                help_flagged_at, errors, started_at, last_activity
            FROM student_progress
            ORDER BY student_id ASC, lesson_id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn list_needing_help(&self) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                student_id, lesson_id, status, sections_completed, current_section,
                code_executions, quiz_score, time_spent_secs, needs_help,
                help_flagged_at, errors, started_at, last_activity
            FROM student_progress
            WHERE needs_help = 1
            ORDER BY student_id ASC, lesson_id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn stale_in_progress(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                student_id, lesson_id, status, sections_completed, current_section,
                code_executions, quiz_score, time_spent_secs, needs_help,
                help_flagged_at, errors, started_at, last_activity
            FROM student_progress
            WHERE status = ?1
              AND last_activity < ?2
            ORDER BY last_activity ASC
            ",
        )
        .bind(CompletionStatus::InProgress.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_progress_row).collect()
    }
}
