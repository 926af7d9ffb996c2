//! Explicit conversation state and its transitions.
//!
//! [`ChatState`] holds everything a chat front end reflects: the transcript,
//! the input buffer, the staged file, the in-flight flags and the error line.
//! It is only ever changed through the transition methods below, which keep
//! these invariants:
//!
//! - the transcript only grows; entries are never edited or reordered
//! - at most one file is staged
//! - at most one ingestion and at most one dispatch are in flight
//! - every started dispatch appends exactly one user and one assistant entry
//!
//! The transitions are synchronous and do no I/O. The orchestrator runs the
//! suspending work between them.

use crate::completion::{build_payload, WireMessage};
use crate::error::{ChatError, IngestError, Operation};
use crate::message::{Message, PendingFile};
use crate::prompts::{
    DISPATCH_FAILURE_REPLY, FILE_CONTENT_MARKER, FILE_PROCESSING_MESSAGE, NO_RESPONSE_REPLY,
    UNSUPPORTED_FILE_TYPE_MESSAGE,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

static NEXT_DISPATCH_ID: AtomicU64 = AtomicU64::new(1);

/// The two in-flight flags. Tracked independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestState {
    pub is_sending_message: bool,
    pub is_ingesting_file: bool,
}

impl RequestState {
    pub fn is_idle(&self) -> bool {
        !self.is_sending_message && !self.is_ingesting_file
    }
}

/// Compose the outgoing user message body.
///
/// Returns `None` when there is nothing to send: the trimmed input is empty
/// and no non-empty extracted text is staged. Empty components are dropped
/// and the rest joined with a newline.
pub fn compose_content(input: &str, staged_text: Option<&str>) -> Option<String> {
    let staged_text = staged_text.filter(|t| !t.is_empty());
    if input.trim().is_empty() && staged_text.is_none() {
        return None;
    }

    let file_part = staged_text
        .map(|t| format!("\n{FILE_CONTENT_MARKER}\n{t}"))
        .unwrap_or_default();

    let parts: Vec<&str> = [input, file_part.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    Some(parts.join("\n"))
}

/// User-facing error line for a failed ingestion.
pub fn ingest_error_message(err: &IngestError) -> &'static str {
    match err {
        IngestError::UnsupportedFileType { .. } => UNSUPPORTED_FILE_TYPE_MESSAGE,
        IngestError::FileProcessing { .. } => FILE_PROCESSING_MESSAGE,
        IngestError::Busy => "A file is already being processed.",
    }
}

/// Proof that a dispatch was started. Consumed by `send_succeeded` / `send_failed`.
///
/// Only [`ChatState::start_send`] can create one, so a reply can never be
/// appended without the matching user message. Each ticket carries a
/// process-unique id; a state only accepts the ticket of its open dispatch.
#[derive(Debug)]
#[must_use = "a started dispatch must be finished with send_succeeded or send_failed"]
pub struct DispatchTicket {
    id: u64,
    user_index: usize,
    payload: Vec<WireMessage>,
}

impl DispatchTicket {
    /// Transcript index of the user message this dispatch answers.
    pub fn user_index(&self) -> usize {
        self.user_index
    }

    /// The `{role, content}` history to send.
    pub fn payload(&self) -> &[WireMessage] {
        &self.payload
    }
}

/// All UI-facing conversation state.
#[derive(Debug, Default)]
pub struct ChatState {
    transcript: Vec<Message>,
    input: String,
    pending: Option<PendingFile>,
    request: RequestState,
    error: Option<String>,
    open_dispatch: Option<u64>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing transcript.
    pub fn with_transcript(transcript: Vec<Message>) -> Self {
        Self {
            transcript,
            ..Self::default()
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn pending_file(&self) -> Option<&PendingFile> {
        self.pending.as_ref()
    }

    pub fn request_state(&self) -> RequestState {
        self.request
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Mark an ingestion as in flight and clear the error line.
    pub fn start_ingestion(&mut self) -> Result<(), IngestError> {
        if self.request.is_ingesting_file {
            return Err(IngestError::Busy);
        }
        self.error = None;
        self.request.is_ingesting_file = true;
        Ok(())
    }

    /// Stage `file`, replacing any previously staged one.
    pub fn ingestion_succeeded(&mut self, file: PendingFile) -> &PendingFile {
        self.request.is_ingesting_file = false;
        self.error = None;
        self.pending.insert(file)
    }

    /// Record the failure. A previously staged file is left as it was.
    pub fn ingestion_failed(&mut self, err: &IngestError) {
        self.request.is_ingesting_file = false;
        self.error = Some(ingest_error_message(err).to_string());
    }

    /// Drop the staged file and the error line.
    pub fn clear_file(&mut self) {
        self.pending = None;
        self.error = None;
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    /// Append the user message and hand back the payload to send.
    ///
    /// Returns `Ok(None)` without touching anything when there is nothing to
    /// send. Otherwise the input buffer and the staged file are cleared
    /// before this returns.
    pub fn start_send(&mut self) -> Result<Option<DispatchTicket>, ChatError> {
        if self.request.is_sending_message {
            return Err(ChatError::Busy {
                operation: Operation::Dispatch,
            });
        }

        let staged_text = self.pending.as_ref().map(|p| p.extracted_text.as_str());
        let Some(content) = compose_content(&self.input, staged_text) else {
            return Ok(None);
        };

        let mut message = Message::user(content);
        if let Some(file) = self.pending.take() {
            message = message.with_attachment(file.attachment());
        }

        let id = NEXT_DISPATCH_ID.fetch_add(1, Ordering::Relaxed);
        self.transcript.push(message);
        self.input.clear();
        self.request.is_sending_message = true;
        self.open_dispatch = Some(id);

        Ok(Some(DispatchTicket {
            id,
            user_index: self.transcript.len() - 1,
            payload: build_payload(&self.transcript),
        }))
    }

    /// Append the reply, or the no-content fallback. Returns its index.
    ///
    /// Fails with [`ChatError::StaleDispatch`], changing nothing, when
    /// `ticket` is not this state's open dispatch.
    pub fn send_succeeded(
        &mut self,
        ticket: DispatchTicket,
        reply: Option<String>,
    ) -> Result<usize, ChatError> {
        let text = reply
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| NO_RESPONSE_REPLY.to_string());
        self.finish_send(ticket, text)
    }

    /// Append the apology turn. Returns its index.
    pub fn send_failed(&mut self, ticket: DispatchTicket) -> Result<usize, ChatError> {
        self.finish_send(ticket, DISPATCH_FAILURE_REPLY.to_string())
    }

    /// Close the open dispatch without its ticket, appending the apology turn.
    ///
    /// For a dispatch whose ticket was lost, e.g. a cancelled send. The lost
    /// ticket is rejected afterwards. `None` when no dispatch is open.
    pub fn abandon_send(&mut self) -> Option<usize> {
        self.open_dispatch.take()?;
        self.transcript.push(Message::assistant(DISPATCH_FAILURE_REPLY));
        self.request.is_sending_message = false;
        Some(self.transcript.len() - 1)
    }

    fn finish_send(&mut self, ticket: DispatchTicket, text: String) -> Result<usize, ChatError> {
        if self.open_dispatch != Some(ticket.id) {
            warn!("Ignoring reply for dispatch {} that is not open", ticket.id);
            return Err(ChatError::StaleDispatch);
        }
        self.open_dispatch = None;
        self.transcript.push(Message::assistant(text));
        self.request.is_sending_message = false;
        Ok(self.transcript.len() - 1)
    }
}
