use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (lessons, student progress, the activity feed,
/// tutor interactions, and indexes).
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lessons (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS student_progress (
                    student_id TEXT NOT NULL,
                    lesson_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    sections_completed TEXT NOT NULL,
                    current_section TEXT NOT NULL,
                    code_executions INTEGER NOT NULL CHECK (code_executions >= 0),
                    quiz_score INTEGER CHECK (quiz_score BETWEEN 0 AND 100),
                    time_spent_secs INTEGER NOT NULL CHECK (time_spent_secs >= 0),
                    needs_help INTEGER NOT NULL CHECK (needs_help IN (0, 1)),
                    help_flagged_at TEXT,
                    errors TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    last_activity TEXT NOT NULL,
                    PRIMARY KEY (student_id, lesson_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS student_activities (
                    id INTEGER PRIMARY KEY,
                    student_id TEXT NOT NULL,
                    lesson_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    detail TEXT,
                    occurred_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS tutor_interactions (
                    id INTEGER PRIMARY KEY,
                    session_id BLOB NOT NULL,
                    student_id TEXT NOT NULL,
                    lesson_id TEXT NOT NULL,
                    message TEXT NOT NULL,
                    reply TEXT NOT NULL,
                    response_kind TEXT NOT NULL,
                    help_level INTEGER NOT NULL CHECK (help_level BETWEEN 1 AND 3),
                    xp_reward INTEGER NOT NULL CHECK (xp_reward >= 0),
                    occurred_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_status_activity
                    ON student_progress (status, last_activity);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_needs_help
                    ON student_progress (needs_help);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_activities_student_occurred
                    ON student_activities (student_id, occurred_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_interactions_session
                    ON tutor_interactions (session_id, occurred_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
