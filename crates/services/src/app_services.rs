use std::sync::Arc;

use academy_core::Clock;
use academy_core::model::{Lesson, LessonId};
use storage::repository::{LessonRepository, Storage};

use crate::error::AppServicesError;
use crate::progress::ProgressService;
use crate::tutor_service::TutorService;

/// Lessons installed on first launch so a fresh database is usable.
const DEFAULT_LESSONS: [(&str, &str); 3] = [
    ("variables-intel", "Mission 1: Variables and Agent Intel"),
    ("io-fieldwork", "Mission 2: Input, Output, Fieldwork"),
    ("loops-patrol", "Mission 3: Loops on Patrol"),
];

/// Assembles app-facing services over a shared storage backend.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
    tutor: Arc<TutorService>,
    lessons: Arc<dyn LessonRepository>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or default
    /// lesson setup fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(storage, clock).await
    }

    /// Build services over an already-opened storage aggregate.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if default lesson setup fails.
    pub async fn from_storage(storage: Storage, clock: Clock) -> Result<Self, AppServicesError> {
        ensure_default_lessons(storage.lessons.as_ref(), clock).await?;

        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.activities),
        ));
        let tutor = Arc::new(TutorService::new(
            clock,
            Arc::clone(&storage.tutor_interactions),
        ));

        Ok(Self {
            progress,
            tutor,
            lessons: storage.lessons,
        })
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn tutor(&self) -> Arc<TutorService> {
        Arc::clone(&self.tutor)
    }

    #[must_use]
    pub fn lessons(&self) -> Arc<dyn LessonRepository> {
        Arc::clone(&self.lessons)
    }
}

async fn ensure_default_lessons(
    lessons: &dyn LessonRepository,
    clock: Clock,
) -> Result<(), AppServicesError> {
    if !lessons.list_lessons(1).await?.is_empty() {
        return Ok(());
    }

    let now = clock.now();
    for (id, title) in DEFAULT_LESSONS {
        let lesson = Lesson::new(LessonId::new(id)?, title, now)?;
        lessons.upsert_lesson(&lesson).await?;
    }
    Ok(())
}
