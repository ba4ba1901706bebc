//! Mapping of service errors to HTTP responses.

use crate::core::errors::{AuthError, ChatError};
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Chat(ChatError),
    BadRequest(String),
    /// Multipart body could not be read; carries the status axum chose.
    Upload(StatusCode, String),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        ApiError::Chat(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Upload(e.status(), e.body_text())
    }
}

const INTERNAL: (StatusCode, &str, &str) = (
    StatusCode::INTERNAL_SERVER_ERROR,
    "INTERNAL_ERROR",
    "internal server error",
);

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        let (status, code, message) = match self {
            ApiError::Auth(AuthError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ApiError::Auth(e @ AuthError::DuplicateUser) => {
                (StatusCode::CONFLICT, "DUPLICATE_USER", e.to_string())
            }
            ApiError::Auth(e @ AuthError::InvalidCredentials) => {
                (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", e.to_string())
            }
            ApiError::Auth(e @ AuthError::Unauthenticated) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", e.to_string())
            }
            ApiError::Auth(e @ (AuthError::Hashing(_) | AuthError::Store(_))) => {
                error!("auth request failed: {e}");
                (INTERNAL.0, INTERNAL.1, INTERNAL.2.to_owned())
            }
            ApiError::Chat(ChatError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            // Sessions of other users are reported exactly like missing ones.
            ApiError::Chat(ChatError::NotFound | ChatError::NotOwner) => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                "chat session not found".to_owned(),
            ),
            ApiError::Chat(e @ ChatError::UnsupportedFormat) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT", e.to_string())
            }
            ApiError::Chat(e @ ChatError::ExtractionFailure(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EXTRACTION_FAILURE",
                e.to_string(),
            ),
            ApiError::Chat(e @ ChatError::EmptyDocument) => {
                (StatusCode::BAD_REQUEST, "EMPTY_DOCUMENT", e.to_string())
            }
            ApiError::Chat(e @ (ChatError::Prompt(_) | ChatError::Store(_))) => {
                error!("chat request failed: {e}");
                (INTERNAL.0, INTERNAL.1, INTERNAL.2.to_owned())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::Upload(status, msg) if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                (*status, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            ApiError::Upload(status, msg) => (*status, "INVALID_UPLOAD", msg.clone()),
        };
        (status, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}
