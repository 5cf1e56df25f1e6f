mod activity;
mod ids;
mod lesson;
mod progress;

pub use activity::{ActivityError, ActivityKind, StudentActivity};
pub use ids::{IdError, LessonId, StudentId, TutorSessionId};
pub use lesson::{Lesson, LessonError, LessonSection};
pub use progress::{CompletionStatus, HELP_ERROR_THRESHOLD, LessonProgress, ProgressError};
