//! Infrastructure traits, used for substitution on higher levels

use crate::infrastructure::entities;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflicting record: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<entities::User>, StoreError>;

    /// Returns [`StoreError::Conflict`] if the username is taken.
    async fn create_user(&self, user: entities::User) -> Result<entities::User, StoreError>;

    async fn create_auth_session(&self, session: entities::AuthSession) -> Result<(), StoreError>;

    async fn find_auth_session(
        &self,
        token_hash: &str,
    ) -> Result<Option<entities::AuthSession>, StoreError>;

    /// Returns `true` if a session was removed.
    async fn delete_auth_session(&self, token_hash: &str) -> Result<bool, StoreError>;

    /// Removes every session that expired at or before `now`.
    async fn delete_expired_auth_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Sessions owned by `user_id`, most recently active first.
    async fn list_sessions(&self, user_id: Uuid)
    -> Result<Vec<entities::SessionSummary>, StoreError>;

    async fn create_session(
        &self,
        session: entities::ChatSession,
    ) -> Result<entities::ChatSession, StoreError>;

    async fn find_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<entities::ChatSession>, StoreError>;

    /// Deletes the session and, by cascade, its messages. Returns `true` if a
    /// row was removed.
    async fn delete_session(&self, session_id: Uuid) -> Result<bool, StoreError>;

    /// Deletes every session owned by `user_id`. Returns the number removed.
    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Replaces the session's document.
    async fn set_document(
        &self,
        session_id: Uuid,
        document_name: Option<String>,
        document_text: String,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Messages in insertion order.
    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<entities::Message>, StoreError>;

    /// Appends a message and marks the session as active at the message time.
    async fn append_message(
        &self,
        message: entities::Message,
    ) -> Result<entities::Message, StoreError>;

    /// Like [`SessionStore::append_message`], and also sets `title` if the
    /// session has none yet. Either everything is written or nothing is.
    async fn append_question(
        &self,
        message: entities::Message,
        title: Option<String>,
    ) -> Result<entities::Message, StoreError>;
}
