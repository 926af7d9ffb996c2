//! # docchat
//!
//! Chat with an LLM about your documents. Upload a PDF or an image, its text
//! is extracted locally and attached to your next message, and the whole
//! conversation goes to an OpenAI-compatible chat-completions API (Groq by
//! default).
//!
//! ## Flow
//!
//! ```text
//! upload ──▶ ingest ──────────────▶ PendingFile ─┐
//!            ├─ PDF   text layer (pdfium)        │
//!            └─ image OCR (vision model)         ▼
//! input  ─────────────────────────────────▶ send ──▶ user Message
//!                                             │
//!                                             ▼
//!                         chat completion (llama-3.3-70b-versatile)
//!                                             │
//!                                             ▼
//!                                      assistant Message
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docchat::{ChatConfig, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GROQ_API_KEY (and DOCCHAT_MODEL / DOCCHAT_BASE_URL if set).
//!     let config = ChatConfig::builder().from_env().build()?;
//!     let mut chat = Orchestrator::new(config)?;
//!
//!     let upload = chat.load_upload("contract.pdf").await?;
//!     chat.ingest_file(upload).await?;
//!     chat.send_message("What are the termination terms?").await?;
//!
//!     if let Some(reply) = chat.transcript().last() {
//!         println!("{}", reply.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docchat` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! docchat = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod completion;
pub mod config;
pub mod error;
pub mod ingest;
pub mod message;
pub mod observer;
pub mod orchestrator;
pub mod prompts;
pub mod state;
pub mod view;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use completion::{CompletionClient, CompletionRequest, HttpCompletionClient, WireMessage};
pub use config::{ChatConfig, ChatConfigBuilder};
pub use error::{ChatError, DispatchError, ExtractError, IngestError};
pub use ingest::ocr::{OcrEngine, OcrWorker};
pub use ingest::pdf::PdfTextExtractor;
pub use message::{Attachment, Message, PendingFile, PreviewHandle, Role, UploadedFile};
pub use observer::ChatObserver;
pub use orchestrator::{Orchestrator, SendOutcome};
pub use state::{ChatState, DispatchTicket, RequestState};
