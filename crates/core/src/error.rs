use thiserror::Error;

use crate::model::IdError;
use crate::model::LessonError;
use crate::model::ProgressError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}
