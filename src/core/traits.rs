//! Seams for the external collaborators: text extraction and answer
//! generation.

use crate::core::assistant::AnswerRequest;
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("uploaded file is not a PDF")]
    UnsupportedFormat,

    #[error("could not extract text: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("request to answer provider failed: {0}")]
    Request(String),

    #[error("answer provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("answer stream failed: {0}")]
    Stream(String),

    #[error("answer provider blocked the request: {0}")]
    Blocked(String),

    #[error("answer provider returned an empty answer")]
    EmptyAnswer,
}

/// Lazy, finite sequence of answer text increments. Not restartable.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, GeneratorError>> + Send>>;

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Converts the raw bytes of an uploaded file into plain text.
    async fn extract_text(&self, bytes: Vec<u8>) -> Result<String, ExtractionError>;
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Starts generating an answer for `request`.
    ///
    /// Errors returned here happen before any text was produced; errors inside
    /// the stream happen mid-answer.
    async fn generate(&self, request: AnswerRequest) -> Result<AnswerStream, GeneratorError>;
}
