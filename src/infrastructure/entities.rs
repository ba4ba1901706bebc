//! Database entities

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Server-side record of a logged-in client. Only the SHA-256 digest of the
/// bearer token is stored.
#[derive(Debug, Clone, FromRow)]
pub struct AuthSession {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub document_name: Option<String>,
    pub document_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn has_document(&self) -> bool {
        self.document_text
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }
}

/// Listing row for a chat session, without the document body.
#[derive(Debug, Clone, FromRow)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: Option<String>,
    pub document_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(u8)]
pub enum MessageKind {
    User = 1,
    Assistant = 2,
    /// Marks a turn whose answer could not be produced.
    Error = 3,
}

#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    pub text: String,
}
