//! PDF text extraction backed by `pdf-extract`.

use crate::core::traits::{DocumentExtractor, ExtractionError};
use async_trait::async_trait;
use log::debug;

const PDF_MAGIC: &[u8] = b"%PDF-";
/// Readers accept the header anywhere in the first kilobyte.
const HEADER_WINDOW: usize = 1024;

#[derive(Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    window
        .windows(PDF_MAGIC.len())
        .any(|candidate| candidate == PDF_MAGIC)
}

#[async_trait]
impl DocumentExtractor for PdfExtractor {
    async fn extract_text(&self, bytes: Vec<u8>) -> Result<String, ExtractionError> {
        if !looks_like_pdf(&bytes) {
            return Err(ExtractionError::UnsupportedFormat);
        }

        // The parser is synchronous and can panic on malformed input; a panic
        // surfaces here as a join error.
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractionError::Failed(format!("parser crashed: {e}")))?
            .map_err(|e| ExtractionError::Failed(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(ExtractionError::Failed(
                "the document contains no extractable text".to_owned(),
            ));
        }

        debug!("extracted {} characters from PDF", text.len());
        Ok(text)
    }
}
