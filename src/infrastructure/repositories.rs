//! DB Repository abstractions

use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{AuthSession, ChatSession, Message, SessionSummary, User};
use crate::infrastructure::traits::{CredentialStore, SessionStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

fn conflict_or_database(error: sqlx::Error, what: &str) -> StoreError {
    match error {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::Conflict(what.to_owned())
        }
        other => StoreError::Database(other),
    }
}

pub struct DbCredentialRepository {
    connection: DatabaseConnection,
}

impl DbCredentialRepository {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl CredentialStore for DbCredentialRepository {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&*self.connection)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        sqlx::query_as(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .fetch_one(&*self.connection)
        .await
        .map_err(|e| conflict_or_database(e, "username"))
    }

    async fn create_auth_session(&self, session: AuthSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO auth_sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token_hash)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&*self.connection)
        .await
        .map_err(|e| conflict_or_database(e, "auth session"))?;
        Ok(())
    }

    async fn find_auth_session(&self, token_hash: &str) -> Result<Option<AuthSession>, StoreError> {
        let session = sqlx::query_as("SELECT * FROM auth_sessions WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(&*self.connection)
            .await?;
        Ok(session)
    }

    async fn delete_auth_session(&self, token_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&*self.connection)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_auth_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&*self.connection)
            .await?;
        Ok(result.rows_affected())
    }
}

pub struct DbSessionRepository {
    connection: DatabaseConnection,
}

impl DbSessionRepository {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl SessionStore for DbSessionRepository {
    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionSummary>, StoreError> {
        let sessions = sqlx::query_as(
            "SELECT id, title, document_name, created_at, last_active_at FROM chat_sessions WHERE user_id = ? ORDER BY last_active_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&*self.connection)
        .await?;
        Ok(sessions)
    }

    async fn create_session(&self, session: ChatSession) -> Result<ChatSession, StoreError> {
        let session = sqlx::query_as(
            "INSERT INTO chat_sessions (id, user_id, title, document_name, document_text, created_at, last_active_at) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.title)
        .bind(session.document_name)
        .bind(session.document_text)
        .bind(session.created_at)
        .bind(session.last_active_at)
        .fetch_one(&*self.connection)
        .await?;
        Ok(session)
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<ChatSession>, StoreError> {
        let session = sqlx::query_as("SELECT * FROM chat_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&*self.connection)
            .await?;
        Ok(session)
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&*self.connection)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&*self.connection)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_document(
        &self,
        session_id: Uuid,
        document_name: Option<String>,
        document_text: String,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE chat_sessions SET document_name = ?, document_text = ?, last_active_at = ? WHERE id = ?",
        )
        .bind(document_name)
        .bind(document_text)
        .bind(at)
        .bind(session_id)
        .execute(&*self.connection)
        .await?;
        Ok(())
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, StoreError> {
        let messages = sqlx::query_as(
            "SELECT id, session_id, kind, created_at, text FROM messages WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&*self.connection)
        .await?;
        Ok(messages)
    }

    async fn append_message(&self, message: Message) -> Result<Message, StoreError> {
        let mut tx = self.connection.begin().await?;
        let stored = insert_message(&mut tx, message).await?;

        sqlx::query("UPDATE chat_sessions SET last_active_at = ? WHERE id = ?")
            .bind(stored.created_at)
            .bind(stored.session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn append_question(
        &self,
        message: Message,
        title: Option<String>,
    ) -> Result<Message, StoreError> {
        let mut tx = self.connection.begin().await?;
        let stored = insert_message(&mut tx, message).await?;

        sqlx::query(
            "UPDATE chat_sessions SET last_active_at = ?, title = COALESCE(title, ?) WHERE id = ?",
        )
        .bind(stored.created_at)
        .bind(title)
        .bind(stored.session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }
}

async fn insert_message(
    tx: &mut Transaction<'_, Sqlite>,
    message: Message,
) -> Result<Message, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO messages (id, session_id, kind, created_at, text) VALUES (?, ?, ?, ?, ?) RETURNING id, session_id, kind, created_at, text",
    )
    .bind(message.id)
    .bind(message.session_id)
    .bind(message.kind)
    .bind(message.created_at)
    .bind(message.text)
    .fetch_one(&mut **tx)
    .await
}
