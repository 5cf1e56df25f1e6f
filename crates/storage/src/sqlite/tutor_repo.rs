use academy_core::model::TutorSessionId;

use super::SqliteRepository;
use super::mapping::map_interaction_row;
use crate::repository::{StorageError, TutorInteractionRecord, TutorInteractionRepository};

#[async_trait::async_trait]
impl TutorInteractionRepository for SqliteRepository {
    async fn append_interaction(
        &self,
        record: &TutorInteractionRecord,
    ) -> Result<i64, StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO tutor_interactions (
                session_id, student_id, lesson_id, message, reply,
                response_kind, help_level, xp_reward, occurred_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(record.session_id.value())
        .bind(record.student_id.as_str())
        .bind(record.lesson_id.as_str())
        .bind(record.message.as_str())
        .bind(record.reply.as_str())
        .bind(record.response_kind.as_str())
        .bind(i64::from(record.help_level))
        .bind(i64::from(record.xp_reward))
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn interactions_for_session(
        &self,
        session_id: TutorSessionId,
    ) -> Result<Vec<TutorInteractionRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, session_id, student_id, lesson_id, message, reply,
                response_kind, help_level, xp_reward, occurred_at
            FROM tutor_interactions
            WHERE session_id = ?1
            ORDER BY occurred_at ASC, id ASC
            ",
        )
        .bind(session_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_interaction_row).collect()
    }
}
