use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use crate::matcher::IntentMatcher;
use crate::mood::MoodState;

/// Asked in order before free conversation starts. Answers are not scored.
pub const INITIAL_QUESTIONS: [&str; 5] = [
    "How would you rate your current mood on a scale of 1-10?",
    "Have you been experiencing any changes in your sleep patterns lately?",
    "Are you having trouble concentrating or making decisions?",
    "How is your appetite and have there been any changes recently?",
    "Are you feeling overwhelmed or experiencing high levels of stress?",
];

pub const ASSESSMENT_COMPLETE: &str =
    "Thank you for answering these questions. Now, how can I help you today?";
pub const EMPTY_INPUT_REPLY: &str = "I didn't catch that. Could you please say it again?";

/// Sessions idle for longer than this are dropped when a new one starts.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error, PartialEq)]
pub enum ConversationError {
    #[error("unknown session {0}")]
    UnknownSession(Uuid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub response: String,
    /// Set only on the turn that finishes the initial assessment.
    pub assessment_complete: bool,
}

impl TurnReply {
    fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            assessment_complete: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    mood: MoodState,
    /// Index of the question currently awaiting an answer.
    question_index: usize,
    assessment_done: bool,
    last_seen: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            mood: MoodState::default(),
            question_index: 0,
            assessment_done: false,
            last_seen: Instant::now(),
        }
    }
}

enum Step {
    Reply(TurnReply),
    Converse(MoodState),
}

/// Owns every live session's mood state and assessment progress.
///
/// The lock is never held while the matcher runs, so a slow model call in one
/// session does not stall the others. Two overlapping turns in the same session
/// race and the later write of the mood state wins.
#[derive(Debug)]
pub struct ConversationManager {
    sessions: Mutex<HashMap<Uuid, Session>>,
    ttl: Duration,
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Opens a fresh session: neutral mood, assessment from the first question.
    ///
    /// `previous` is the session the client is leaving; it is discarded along
    /// with any session idle for longer than the TTL.
    pub fn start(&self, previous: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.lock();
        if let Some(old) = previous {
            if sessions.remove(&old).is_some() {
                log::info!("Closed session {}", old);
            }
        }
        let before = sessions.len();
        sessions.retain(|_, s| s.last_seen.elapsed() <= self.ttl);
        if sessions.len() < before {
            log::info!("Evicted {} idle sessions", before - sessions.len());
        }
        sessions.insert(id, Session::new());
        log::info!("Started session {}", id);
        id
    }

    pub fn mood(&self, id: Uuid) -> Option<MoodState> {
        self.sessions.lock().get(&id).map(|s| s.mood.clone())
    }

    /// Processes one user turn. Only the empty string is rejected; whitespace
    /// is a legitimate answer and goes through the pipeline.
    pub async fn handle(
        &self,
        id: Uuid,
        message: &str,
        matcher: &IntentMatcher,
    ) -> Result<TurnReply, ConversationError> {
        if message.is_empty() {
            return Ok(TurnReply::text(EMPTY_INPUT_REPLY));
        }

        let mut mood = match self.step(id, message)? {
            Step::Reply(reply) => return Ok(reply),
            Step::Converse(mood) => mood,
        };

        let reply = matcher.respond(message, &mut mood).await;
        log::debug!(
            "Session {} answered via {:?} (tag {:?})",
            id,
            reply.source,
            reply.tag
        );

        if let Some(session) = self.sessions.lock().get_mut(&id) {
            session.mood = mood;
        }
        Ok(TurnReply::text(reply.text))
    }

    fn step(&self, id: Uuid, message: &str) -> Result<Step, ConversationError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&id)
            .ok_or(ConversationError::UnknownSession(id))?;
        session.last_seen = Instant::now();

        if session.assessment_done {
            return Ok(Step::Converse(session.mood.clone()));
        }

        log::info!(
            "Session {} question {} answer: {}",
            id,
            session.question_index + 1,
            message
        );
        session.question_index += 1;
        match INITIAL_QUESTIONS.get(session.question_index) {
            Some(question) => Ok(Step::Reply(TurnReply::text(*question))),
            None => {
                session.assessment_done = true;
                session.question_index = 0;
                Ok(Step::Reply(TurnReply {
                    response: ASSESSMENT_COMPLETE.to_string(),
                    assessment_complete: true,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{intent, mood_table};
    use crate::dataset::{Corpus, Dataset};
    use crate::fallback::tests::FakeModel;
    use crate::fallback::FallbackResponder;
    use crate::matcher::{MatchPolicy, DEFAULT_REPLY};
    use std::sync::Arc;

    fn matcher() -> IntentMatcher {
        let dataset = Dataset::new(
            Corpus::new(vec![intent("greeting", &["hello"], &["Hi there!"])], vec![]),
            mood_table(),
        )
        .unwrap();
        IntentMatcher::new(
            Arc::new(dataset),
            MatchPolicy::default(),
            FallbackResponder::new(Arc::new(FakeModel::unavailable()), 300),
        )
    }

    async fn finish_assessment(manager: &ConversationManager, id: Uuid, matcher: &IntentMatcher) {
        for _ in 0..INITIAL_QUESTIONS.len() {
            manager.handle(id, "fine", matcher).await.unwrap();
        }
    }

    #[tokio::test]
    async fn assessment_asks_questions_in_order() {
        let manager = ConversationManager::new();
        let matcher = matcher();
        let id = manager.start(None);

        for expected in &INITIAL_QUESTIONS[1..] {
            let reply = manager.handle(id, "some answer", &matcher).await.unwrap();
            assert_eq!(reply.response, *expected);
            assert!(!reply.assessment_complete);
        }

        let reply = manager.handle(id, "last answer", &matcher).await.unwrap();
        assert_eq!(reply.response, ASSESSMENT_COMPLETE);
        assert!(reply.assessment_complete);

        // Assessment answers never touch the mood state.
        assert_eq!(manager.mood(id), Some(MoodState::default()));
    }

    #[tokio::test]
    async fn conversation_follows_assessment() {
        let manager = ConversationManager::new();
        let matcher = matcher();
        let id = manager.start(None);
        finish_assessment(&manager, id, &matcher).await;

        let reply = manager.handle(id, "Hello!", &matcher).await.unwrap();
        assert_eq!(reply.response, "Hi there!");
        assert!(!reply.assessment_complete);

        manager.handle(id, "I feel sad", &matcher).await.unwrap();
        let mood = manager.mood(id).unwrap();
        assert_eq!(mood.current_mood, "sad");
        assert_eq!(mood.mood_score, 4);
        assert_eq!(mood.conversation_keywords, ["hello!", "i feel sad"]);
    }

    #[tokio::test]
    async fn empty_message_is_not_processed() {
        let manager = ConversationManager::new();
        let matcher = matcher();
        let id = manager.start(None);

        let reply = manager.handle(id, "", &matcher).await.unwrap();
        assert_eq!(reply.response, EMPTY_INPUT_REPLY);

        // Still on the first question.
        let reply = manager.handle(id, "7", &matcher).await.unwrap();
        assert_eq!(reply.response, INITIAL_QUESTIONS[1]);
    }

    #[tokio::test]
    async fn whitespace_message_is_an_answer() {
        let manager = ConversationManager::new();
        let matcher = matcher();
        let id = manager.start(None);

        let reply = manager.handle(id, "   ", &matcher).await.unwrap();
        assert_eq!(reply.response, INITIAL_QUESTIONS[1]);

        finish_assessment(&manager, id, &matcher).await;
        let reply = manager.handle(id, " ", &matcher).await.unwrap();
        assert_eq!(reply.response, DEFAULT_REPLY);
        assert_eq!(manager.mood(id).unwrap().conversation_keywords, [" "]);
    }

    #[tokio::test]
    async fn new_chat_replaces_previous_session() {
        let manager = ConversationManager::new();
        let matcher = matcher();
        let old = manager.start(None);
        let other = manager.start(None);

        let new = manager.start(Some(old));
        assert_ne!(new, old);
        assert_eq!(manager.mood(old), None);
        assert_eq!(
            manager.handle(old, "hello", &matcher).await,
            Err(ConversationError::UnknownSession(old))
        );
        assert!(manager.mood(other).is_some());
        assert!(manager.mood(new).is_some());
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let manager = ConversationManager::with_ttl(Duration::from_millis(200));
        let matcher = matcher();
        let idle = manager.start(None);
        let active = manager.start(None);

        tokio::time::sleep(Duration::from_millis(400)).await;
        manager.handle(active, "7", &matcher).await.unwrap();
        let fresh = manager.start(None);

        assert_eq!(manager.mood(idle), None);
        assert!(manager.mood(active).is_some());
        assert!(manager.mood(fresh).is_some());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let manager = ConversationManager::new();
        let matcher = matcher();
        let first = manager.start(None);
        let second = manager.start(None);
        finish_assessment(&manager, first, &matcher).await;
        finish_assessment(&manager, second, &matcher).await;

        manager.handle(first, "so happy", &matcher).await.unwrap();
        assert_eq!(manager.mood(first).unwrap().mood_score, 6);
        assert_eq!(manager.mood(second), Some(MoodState::default()));
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let manager = ConversationManager::new();
        let id = Uuid::new_v4();
        assert_eq!(
            manager.handle(id, "hello", &matcher()).await,
            Err(ConversationError::UnknownSession(id))
        );
    }
}
