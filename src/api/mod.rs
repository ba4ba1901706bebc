use crate::core::auth::AuthGateway;
use crate::core::errors::AuthError;
use crate::core::services::ChatManager;
use async_trait::async_trait;
use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use axum::routing::get;
use uuid::Uuid;

pub mod auth;
pub mod error;
pub mod sessions;

use error::ApiError;

pub const SESSION_COOKIE: &str = "session";

/// Everything a handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthGateway,
    pub chats: ChatManager,
    pub session_ttl: chrono::Duration,
    pub max_upload_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .nest("/sessions", sessions::router(max_upload_bytes))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// The authenticated user of a request.
#[derive(Debug)]
pub struct ExtractUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for ExtractUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = session_token(&parts.headers).ok_or(AuthError::Unauthenticated)?;
        let user_id = state.auth.authenticate(&token).await?;
        Ok(ExtractUser(user_id))
    }
}

/// Finds the auth token in `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_owned());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}
