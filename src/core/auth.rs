//! Registration, login and bearer-token authentication.

use crate::core::errors::AuthError;
use crate::infrastructure::entities::{AuthSession, User};
use crate::infrastructure::traits::{CredentialStore, StoreError};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

const MAX_USERNAME_CHARS: usize = 64;

/// Result of a successful login. `token` is only ever handed to the client.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: String,
    pub user_id: Uuid,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuthGateway {
    credentials: Arc<dyn CredentialStore>,
    session_ttl: Duration,
}

impl AuthGateway {
    pub fn new(credentials: Arc<dyn CredentialStore>, session_ttl: Duration) -> Self {
        Self {
            credentials,
            session_ttl,
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = validate_credentials(username, password)?;

        if self
            .credentials
            .find_user_by_username(username)
            .await?
            .is_some()
        {
            info!("registration rejected, user '{username}' already exists");
            return Err(AuthError::DuplicateUser);
        }

        let password_hash = hash_password(password.to_owned()).await?;
        let user = self
            .credentials
            .create_user(User {
                id: Uuid::new_v4(),
                username: username.to_owned(),
                password_hash,
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::DuplicateUser,
                other => AuthError::Store(other),
            })?;

        info!("registered user '{}'", user.username);
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginSession, AuthError> {
        let username = validate_credentials(username, password)?;

        let Some(user) = self.credentials.find_user_by_username(username).await? else {
            info!("login failed for unknown user '{username}'");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password.to_owned(), user.password_hash.clone()).await? {
            info!("login failed for user '{username}'");
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let purged = self.credentials.delete_expired_auth_sessions(now).await?;
        if purged > 0 {
            debug!("purged {purged} expired auth sessions");
        }

        let token = new_token();
        let expires_at = now + self.session_ttl;
        self.credentials
            .create_auth_session(AuthSession {
                token_hash: hash_token(&token),
                user_id: user.id,
                created_at: now,
                expires_at,
            })
            .await?;

        info!("user '{username}' logged in");
        Ok(LoginSession {
            token,
            user_id: user.id,
            username: user.username,
            expires_at,
        })
    }

    /// Invalidates `token`. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if self
            .credentials
            .delete_auth_session(&hash_token(token))
            .await?
        {
            info!("auth session closed");
        }
        Ok(())
    }

    /// Resolves a bearer token to the id of the user it was issued to.
    pub async fn authenticate(&self, token: &str) -> Result<Uuid, AuthError> {
        let token_hash = hash_token(token);
        let session = self
            .credentials
            .find_auth_session(&token_hash)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if session.expires_at <= Utc::now() {
            warn!("rejected expired auth session for user {}", session.user_id);
            self.credentials.delete_auth_session(&token_hash).await?;
            return Err(AuthError::Unauthenticated);
        }

        Ok(session.user_id)
    }
}

fn validate_credentials<'a>(username: &'a str, password: &str) -> Result<&'a str, AuthError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::Validation(
            "username and password are required".to_owned(),
        ));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(AuthError::Validation(format!(
            "username must be at most {MAX_USERNAME_CHARS} characters"
        )));
    }
    Ok(username)
}

/// 32 random bytes from the OS, hex encoded.
fn new_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Hashing(e.to_string()))?
}

async fn verify_password(password: String, stored: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored).map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AuthError::Hashing(e.to_string()))?
}
