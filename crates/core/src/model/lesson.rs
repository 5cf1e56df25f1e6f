use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::LessonId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("unknown lesson section: {0}")]
    UnknownSection(String),
}

//
// ─── SECTIONS ──────────────────────────────────────────────────────────────────
//

/// The fixed section sequence every lesson walks through.
///
/// Students always move `Learn → Code → Quiz → Submit`; there are no
/// optional or reordered sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LessonSection {
    /// Reading and worked examples.
    Learn,
    /// Hands-on coding exercise.
    Code,
    /// Short knowledge check.
    Quiz,
    /// Final hand-in of the exercise.
    Submit,
}

impl LessonSection {
    /// Section order for every lesson.
    pub const SEQUENCE: [LessonSection; 4] = [
        LessonSection::Learn,
        LessonSection::Code,
        LessonSection::Quiz,
        LessonSection::Submit,
    ];

    /// Number of sections in a lesson.
    pub const TOTAL: usize = Self::SEQUENCE.len();

    /// Storage and display token for this section.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LessonSection::Learn => "learn",
            LessonSection::Code => "code",
            LessonSection::Quiz => "quiz",
            LessonSection::Submit => "submit",
        }
    }

    /// Parses a section token.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::UnknownSection` for anything outside the fixed
    /// sequence.
    pub fn parse(value: &str) -> Result<Self, LessonError> {
        match value {
            "learn" => Ok(LessonSection::Learn),
            "code" => Ok(LessonSection::Code),
            "quiz" => Ok(LessonSection::Quiz),
            "submit" => Ok(LessonSection::Submit),
            other => Err(LessonError::UnknownSection(other.to_string())),
        }
    }

    /// The section that follows this one, or `None` at the end of the
    /// sequence.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let index = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(index + 1).copied()
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// A lesson students can take. Content itself lives in the hosted backend;
/// the core only needs identity and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    id: LessonId,
    title: String,
    created_at: DateTime<Utc>,
}

impl Lesson {
    /// Creates a new lesson.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::EmptyTitle` if the title is blank.
    pub fn new(
        id: LessonId,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LessonError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        Ok(Self {
            id,
            title,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> &LessonId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn section_sequence_is_four_long() {
        assert_eq!(LessonSection::TOTAL, 4);
        assert_eq!(LessonSection::SEQUENCE[0], LessonSection::Learn);
        assert_eq!(LessonSection::SEQUENCE[3], LessonSection::Submit);
    }

    #[test]
    fn section_tokens_roundtrip() {
        for section in LessonSection::SEQUENCE {
            assert_eq!(LessonSection::parse(section.as_str()).unwrap(), section);
        }
        assert!(matches!(
            LessonSection::parse("bonus"),
            Err(LessonError::UnknownSection(_))
        ));
    }

    #[test]
    fn next_walks_the_sequence() {
        assert_eq!(LessonSection::Learn.next(), Some(LessonSection::Code));
        assert_eq!(LessonSection::Quiz.next(), Some(LessonSection::Submit));
        assert_eq!(LessonSection::Submit.next(), None);
    }

    #[test]
    fn lesson_requires_title() {
        let id = LessonId::new("lesson-A").unwrap();
        assert!(matches!(
            Lesson::new(id.clone(), "  ", fixed_now()),
            Err(LessonError::EmptyTitle)
        ));
        let lesson = Lesson::new(id, "Variables and You", fixed_now()).unwrap();
        assert_eq!(lesson.title(), "Variables and You");
    }
}
