//! Error types for the docchat library.
//!
//! Four error types reflect four distinct failure surfaces:
//!
//! * [`ChatError`] — construction, configuration and upload-loading problems,
//!   plus `Busy` when an operation of the same kind is already in flight.
//!   These are returned to the caller as `Err`.
//!
//! * [`IngestError`] — a file could not be staged. Non-fatal: the
//!   orchestrator records a user-facing error string and stays interactive.
//!
//! * [`ExtractError`] — the underlying reason a PDF or OCR extraction failed.
//!   Always wrapped in [`IngestError::FileProcessing`].
//!
//! * [`DispatchError`] — the completion API call failed. Never surfaced as an
//!   `Err` from `send`; it is absorbed into the transcript as a fallback
//!   assistant turn and logged.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by orchestrator construction and the upload loaders.
#[derive(Debug, Error)]
pub enum ChatError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// The completion backend needs an API key and none was supplied.
    #[error("No API key configured for the completion API.\nSet {env_var} or pass --api-key.")]
    MissingCredential { env_var: &'static str },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A named edgequake-llm provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Upload loading ────────────────────────────────────────────────────
    /// Upload file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a file path nor a usable URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── State ─────────────────────────────────────────────────────────────
    /// An operation of the same kind is already in flight.
    #[error("A {operation} is already in progress")]
    Busy { operation: Operation },

    /// A reply was offered with a ticket that is not the open dispatch.
    #[error("Dispatch ticket does not belong to the open send")]
    StaleDispatch,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The two independently serialised operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ingestion,
    Dispatch,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Ingestion => f.write_str("file ingestion"),
            Operation::Dispatch => f.write_str("message dispatch"),
        }
    }
}

/// A file could not be staged for the next message.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Declared media type is neither `application/pdf` nor `image/*`.
    #[error("Unsupported file type '{mime_type}'")]
    UnsupportedFileType { mime_type: String },

    /// The extraction pipeline failed for this file.
    #[error("Failed to process '{file_name}': {source}")]
    FileProcessing {
        file_name: String,
        #[source]
        source: ExtractError,
    },

    /// Another ingestion is still running.
    #[error("A file is already being processed")]
    Busy,
}

/// Why a PDF text-layer read or an OCR pass failed.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt or encrypted: {0}")]
    CorruptPdf(String),

    /// pdfium returned an error while reading a page's text layer.
    #[error("Text extraction failed for page {page}: {detail}")]
    PageText { page: usize, detail: String },

    /// The image bytes could not be decoded.
    #[error("Image could not be decoded: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// No OCR engine is available for image uploads.
    #[error("No OCR engine configured.\n{hint}")]
    NoOcrEngine { hint: String },

    /// The OCR engine failed to recognise the image.
    #[error("OCR failed: {detail}")]
    Ocr { detail: String },

    /// A blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// The completion API call failed or returned unusable data.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Connection, TLS or body transfer failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request exceeded the configured timeout.
    #[error("Completion request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The API answered with a non-success status.
    #[error("Completion API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("Malformed completion response: {0}")]
    Malformed(String),

    /// An edgequake-llm provider returned an error.
    #[error("LLM provider error: {0}")]
    Provider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_env_var() {
        let e = ChatError::MissingCredential {
            env_var: "GROQ_API_KEY",
        };
        assert!(e.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn busy_display_names_operation() {
        let e = ChatError::Busy {
            operation: Operation::Dispatch,
        };
        assert_eq!(e.to_string(), "A message dispatch is already in progress");
    }

    #[test]
    fn file_processing_carries_source() {
        let e = IngestError::FileProcessing {
            file_name: "scan.png".into(),
            source: ExtractError::Ocr {
                detail: "503".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("scan.png"), "got: {msg}");
        assert!(msg.contains("503"), "got: {msg}");
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn api_error_display() {
        let e = DispatchError::Api {
            status: 401,
            body: "invalid key".into(),
        };
        assert!(e.to_string().contains("401"));
        assert!(e.to_string().contains("invalid key"));
    }
}
