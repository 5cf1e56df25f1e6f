use academy_core::model::StudentId;

use super::SqliteRepository;
use super::mapping::map_activity_row;
use crate::repository::{ActivityRecord, ActivityRepository, StorageError};

#[async_trait::async_trait]
impl ActivityRepository for SqliteRepository {
    async fn append_activity(&self, record: &ActivityRecord) -> Result<i64, StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO student_activities (student_id, lesson_id, kind, detail, occurred_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(record.student_id.as_str())
        .bind(record.lesson_id.as_str())
        .bind(record.kind.as_str())
        .bind(record.detail.as_deref())
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn activities_for_student(
        &self,
        student_id: &StudentId,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, student_id, lesson_id, kind, detail, occurred_at
            FROM student_activities
            WHERE student_id = ?1
            ORDER BY occurred_at DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(student_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_activity_row).collect()
    }
}
