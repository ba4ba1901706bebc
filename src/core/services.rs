//! Chat session orchestration.

use crate::core::assistant::{AnswerRequest, Prompts};
use crate::core::errors::ChatError;
use crate::core::traits::{AnswerGenerator, DocumentExtractor, GeneratorError};
use crate::infrastructure::entities::{ChatSession, Message, MessageKind, SessionSummary};
use crate::infrastructure::traits::SessionStore;
use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

const TITLE_CHARS: usize = 40;

/// Progress of one answer, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Part(String),
    /// The full answer was stored as an assistant message.
    Completed { message_id: Uuid },
    /// No answer was stored; an error marker took its place.
    Failed { message_id: Uuid, error: String },
}

/// A question that was accepted. `events` yields the answer as it is
/// generated and always ends with `Completed` or `Failed`.
#[derive(Debug)]
pub struct AnswerTurn {
    pub user_message: Message,
    pub answer_message_id: Uuid,
    pub events: mpsc::Receiver<TurnEvent>,
}

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub session_id: Uuid,
    pub document_name: Option<String>,
    pub characters: usize,
}

#[derive(Debug, thiserror::Error)]
enum TurnFailure {
    #[error(transparent)]
    Upstream(#[from] GeneratorError),

    #[error("client disconnected")]
    Disconnected,
}

#[derive(Clone)]
pub struct ChatManager {
    sessions: Arc<dyn SessionStore>,
    extractor: Arc<dyn DocumentExtractor>,
    generator: Arc<dyn AnswerGenerator>,
    prompts: Arc<Prompts>,
    stream_buffer: usize,
}

impl ChatManager {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        extractor: Arc<dyn DocumentExtractor>,
        generator: Arc<dyn AnswerGenerator>,
        prompts: Arc<Prompts>,
        stream_buffer: usize,
    ) -> Self {
        Self {
            sessions,
            extractor,
            generator,
            prompts,
            stream_buffer: stream_buffer.max(1),
        }
    }

    pub async fn create_session(&self, user_id: Uuid) -> Result<ChatSession, ChatError> {
        let now = Utc::now();
        let session = self
            .sessions
            .create_session(ChatSession {
                id: Uuid::new_v4(),
                user_id,
                title: None,
                document_name: None,
                document_text: None,
                created_at: now,
                last_active_at: now,
            })
            .await?;

        info!("user {user_id} created chat session {}", session.id);
        Ok(session)
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionSummary>, ChatError> {
        Ok(self.sessions.list_sessions(user_id).await?)
    }

    pub async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> Result<(), ChatError> {
        self.owned_session(user_id, session_id).await?;

        if !self.sessions.delete_session(session_id).await? {
            return Err(ChatError::NotFound);
        }

        info!("user {user_id} deleted chat session {session_id}");
        Ok(())
    }

    /// Deletes all of the user's sessions and their messages. Returns how
    /// many sessions were removed.
    pub async fn delete_all_sessions(&self, user_id: Uuid) -> Result<u64, ChatError> {
        let deleted = self.sessions.delete_user_sessions(user_id).await?;

        info!("user {user_id} cleared chat history, {deleted} sessions deleted");
        Ok(deleted)
    }

    pub async fn list_messages(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Vec<Message>, ChatError> {
        self.owned_session(user_id, session_id).await?;
        Ok(self.sessions.list_messages(session_id).await?)
    }

    /// Extracts the text of `bytes` and makes it the session's document,
    /// replacing any earlier one.
    pub async fn upload_document(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        document_name: Option<String>,
        bytes: Vec<u8>,
    ) -> Result<UploadedDocument, ChatError> {
        self.owned_session(user_id, session_id).await?;

        let size = bytes.len();
        let text = self.extractor.extract_text(bytes).await.map_err(|e| {
            warn!("document upload for chat session {session_id} rejected: {e}");
            ChatError::from(e)
        })?;
        let characters = text.chars().count();

        self.sessions
            .set_document(session_id, document_name.clone(), text, Utc::now())
            .await?;

        info!(
            "stored document for chat session {session_id}: {size} bytes, {characters} characters"
        );
        Ok(UploadedDocument {
            session_id,
            document_name,
            characters,
        })
    }

    /// Records `question` and starts answering it in the background.
    ///
    /// Nothing is written when this returns an error. Concurrent calls on the
    /// same session are not serialized; their messages may interleave.
    pub async fn ask(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        question: &str,
    ) -> Result<AnswerTurn, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::Validation("question is required".to_owned()));
        }

        let session = self.owned_session(user_id, session_id).await?;
        if !session.has_document() {
            return Err(ChatError::EmptyDocument);
        }
        let document_text = session.document_text.unwrap_or_default();

        let user_message = Message {
            id: Uuid::new_v4(),
            session_id,
            kind: MessageKind::User,
            created_at: Utc::now(),
            text: question.to_owned(),
        };

        let mut history = self.sessions.list_messages(session_id).await?;
        history.push(user_message.clone());
        let request = AnswerRequest::from_history(&self.prompts, &document_text, &history)?;

        let title = session
            .title
            .is_none()
            .then(|| title_from_question(question));
        let user_message = self.sessions.append_question(user_message, title).await?;

        let (sender, events) = mpsc::channel(self.stream_buffer);
        let answer_message_id = Uuid::new_v4();
        let manager = self.clone();
        tokio::spawn(async move {
            manager
                .run_turn(session_id, answer_message_id, request, sender)
                .await
        });

        debug!(
            "answering question in chat session {session_id} with {} context messages",
            history.len()
        );
        Ok(AnswerTurn {
            user_message,
            answer_message_id,
            events,
        })
    }

    async fn run_turn(
        self,
        session_id: Uuid,
        message_id: Uuid,
        request: AnswerRequest,
        sender: mpsc::Sender<TurnEvent>,
    ) {
        let (kind, text, event) = match self.forward_answer(request, &sender).await {
            Ok(answer) => (
                MessageKind::Assistant,
                answer,
                TurnEvent::Completed { message_id },
            ),
            Err(failure) => {
                warn!("answer for chat session {session_id} failed: {failure}");
                let reason = failure.to_string();
                (
                    MessageKind::Error,
                    reason.clone(),
                    TurnEvent::Failed {
                        message_id,
                        error: reason,
                    },
                )
            }
        };

        let saved = self
            .sessions
            .append_message(Message {
                id: message_id,
                session_id,
                kind,
                created_at: Utc::now(),
                text,
            })
            .await;

        let event = match saved {
            Ok(_) => event,
            Err(e) => {
                error!("failed to save answer for chat session {session_id}: {e}");
                TurnEvent::Failed {
                    message_id,
                    error: "failed to save answer".to_owned(),
                }
            }
        };

        // The receiver is gone if the client disconnected.
        let _ = sender.send(event).await;
    }

    async fn forward_answer(
        &self,
        request: AnswerRequest,
        sender: &mpsc::Sender<TurnEvent>,
    ) -> Result<String, TurnFailure> {
        // A vanished client is noticed even while the generator is silent.
        let mut stream = tokio::select! {
            stream = self.generator.generate(request) => stream?,
            _ = sender.closed() => return Err(TurnFailure::Disconnected),
        };
        let mut answer = String::new();

        loop {
            let part = tokio::select! {
                part = stream.next() => part,
                _ = sender.closed() => return Err(TurnFailure::Disconnected),
            };
            let Some(part) = part else {
                break;
            };
            let part = part?;
            if part.is_empty() {
                continue;
            }
            answer.push_str(&part);
            sender
                .send(TurnEvent::Part(part))
                .await
                .map_err(|_| TurnFailure::Disconnected)?;
        }

        if answer.trim().is_empty() {
            return Err(GeneratorError::EmptyAnswer.into());
        }
        Ok(answer)
    }

    async fn owned_session(&self, user_id: Uuid, session_id: Uuid) -> Result<ChatSession, ChatError> {
        let session = self
            .sessions
            .find_session(session_id)
            .await?
            .ok_or(ChatError::NotFound)?;

        if session.user_id != user_id {
            warn!("user {user_id} tried to access chat session {session_id} of another user");
            return Err(ChatError::NotOwner);
        }

        Ok(session)
    }
}

/// First words of the opening question, used as the session title.
pub fn title_from_question(question: &str) -> String {
    let question = question.trim();
    if question.chars().count() <= TITLE_CHARS {
        return question.to_owned();
    }
    let head: String = question.chars().take(TITLE_CHARS).collect();
    format!("{}...", head.trim_end())
}
