//! Service-level errors

use crate::core::traits::ExtractionError;
use crate::infrastructure::traits::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("username already exists")]
    DuplicateUser,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),

    #[error("chat session not found")]
    NotFound,

    /// The session exists but belongs to another user.
    #[error("chat session belongs to another user")]
    NotOwner,

    #[error("uploaded file is not a PDF")]
    UnsupportedFormat,

    #[error("could not extract text from the document: {0}")]
    ExtractionFailure(String),

    #[error("no document has been uploaded for this chat session")]
    EmptyDocument,

    #[error("failed to render prompt: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ExtractionError> for ChatError {
    fn from(error: ExtractionError) -> Self {
        match error {
            ExtractionError::UnsupportedFormat => ChatError::UnsupportedFormat,
            ExtractionError::Failed(reason) => ChatError::ExtractionFailure(reason),
        }
    }
}
