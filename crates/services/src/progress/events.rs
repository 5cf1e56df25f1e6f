use academy_core::model::{ActivityKind, LessonId, StudentId};

/// Change notification fanned out to dashboard listeners after every
/// progress write. The payload names the pair and what happened; listeners
/// re-read through the service rather than trusting the event content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub student_id: StudentId,
    pub lesson_id: LessonId,
    pub kind: ActivityKind,
}
