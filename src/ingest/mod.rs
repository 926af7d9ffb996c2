//! File ingestion: turn an uploaded file into text for the next message.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ classify ──┬─▶ pdf  (text layer, pdfium)
//! (path/URL)  (mime)   └─▶ ocr  (vision model, one worker per file)
//! ```
//!
//! 1. [`input`] — load a local path or URL into an [`UploadedFile`]
//! 2. classify  — `application/pdf` and `image/*` are accepted, nothing else
//! 3. [`pdf`]   — read each page's text tokens in order and join them
//! 4. [`ocr`]   — acquire an OCR worker, recognise, always terminate it

pub mod input;
pub mod ocr;
pub mod pdf;

use crate::error::{ExtractError, IngestError};
use crate::message::{FileKind, UploadedFile};
use ocr::OcrEngine;
use pdf::PdfTextExtractor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Routes an upload to the right extractor.
pub struct Ingestor {
    pdf: Arc<dyn PdfTextExtractor>,
    ocr: Result<Arc<dyn OcrEngine>, String>,
    language: String,
}

impl Ingestor {
    /// `ocr` is either an engine or the reason none could be created; the
    /// reason is reported when an image is uploaded.
    pub fn new(
        pdf: Arc<dyn PdfTextExtractor>,
        ocr: Result<Arc<dyn OcrEngine>, String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            pdf,
            ocr,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Extract the text of `file` according to its declared media type.
    ///
    /// An empty result is not an error.
    pub async fn extract(&self, file: &UploadedFile) -> Result<String, IngestError> {
        let kind = FileKind::classify(&file.mime_type).ok_or_else(|| {
            IngestError::UnsupportedFileType {
                mime_type: file.mime_type.clone(),
            }
        })?;

        info!(
            "Extracting text from '{}' ({}, {} bytes)",
            file.name,
            file.mime_type,
            file.bytes.len()
        );
        let start = Instant::now();

        let result = match kind {
            FileKind::Pdf => pdf::extract_pdf_text(self.pdf.as_ref(), &file.bytes).await,
            FileKind::Image => match &self.ocr {
                Ok(engine) => {
                    ocr::recognize_image(
                        engine.as_ref(),
                        &self.language,
                        &file.bytes,
                        &file.mime_type,
                    )
                    .await
                }
                Err(hint) => Err(ExtractError::NoOcrEngine { hint: hint.clone() }),
            },
        };

        let text = result.map_err(|source| IngestError::FileProcessing {
            file_name: file.name.clone(),
            source,
        })?;

        debug!(
            "Extracted {} chars from '{}' in {:?}",
            text.chars().count(),
            file.name,
            start.elapsed()
        );
        Ok(text)
    }
}
