use std::sync::Arc;

use tracing::warn;

use academy_core::Clock;
use academy_core::model::{LessonId, StudentId, TutorSessionId};
use academy_core::tutor::{TutorPolicy, TutorReply, TutorRequest};
use storage::repository::{StorageError, TutorInteractionRecord, TutorInteractionRepository};

/// Serves canned tutoring replies and records each exchange.
///
/// The selector itself is pure and lives in the core crate; this service
/// adds session identity and the interaction log. Replying never fails:
/// when the log append fails the exchange is dropped from history with a
/// warning and the student still gets their reply.
#[derive(Clone)]
pub struct TutorService {
    clock: Clock,
    policy: TutorPolicy,
    interactions: Arc<dyn TutorInteractionRepository>,
}

impl TutorService {
    #[must_use]
    pub fn new(clock: Clock, interactions: Arc<dyn TutorInteractionRepository>) -> Self {
        Self {
            clock,
            policy: TutorPolicy::default(),
            interactions,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: TutorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Mints a fresh tutoring session id.
    #[must_use]
    pub fn open_session(&self) -> TutorSessionId {
        TutorSessionId::random()
    }

    /// Selects the reply for one tutoring turn and best-effort logs it.
    pub async fn reply(
        &self,
        session_id: TutorSessionId,
        student_id: &StudentId,
        lesson_id: &LessonId,
        request: &TutorRequest,
    ) -> TutorReply {
        let reply = self.policy.respond(request);

        let record = TutorInteractionRecord {
            id: None,
            session_id,
            student_id: student_id.clone(),
            lesson_id: lesson_id.clone(),
            message: request.message.clone(),
            reply: reply.text.clone(),
            response_kind: reply.kind.as_str().to_string(),
            help_level: reply.help_level.value(),
            xp_reward: reply.xp_reward,
            occurred_at: self.clock.now(),
        };
        if let Err(e) = self.interactions.append_interaction(&record).await {
            warn!(error = %e, session = %session_id, "tutor interaction append failed");
        }

        reply
    }

    /// Full exchange history for a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    pub async fn session_transcript(
        &self,
        session_id: TutorSessionId,
    ) -> Result<Vec<TutorInteractionRecord>, StorageError> {
        self.interactions.interactions_for_session(session_id).await
    }
}
