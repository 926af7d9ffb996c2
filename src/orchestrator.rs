//! The conversation orchestrator.
//!
//! [`Orchestrator`] owns the [`ChatState`] and the three collaborators (PDF
//! extractor, OCR engine, completion client) and sequences them:
//!
//! ```text
//! ingest_file:  start_ingestion ─▶ extract (await) ─▶ ingestion_succeeded | ingestion_failed
//! send:         start_send ─▶ complete (await) ─▶ send_succeeded | send_failed
//! ```
//!
//! Every transition is reported to the configured [`ChatObserver`] right
//! after it happens, so a front end sees the user's message and the cleared
//! input before the completion request has even left the process.
//!
//! `send` is also available in two halves, [`Orchestrator::begin_send`] and
//! [`Orchestrator::finish_send`], for callers that drive the network call
//! themselves. While a dispatch is open a second `begin_send` fails with
//! [`ChatError::Busy`]. A caller that loses its ticket closes the dispatch
//! with [`Orchestrator::abandon_send`]. If the `send` future is dropped before
//! the reply arrives, the same apology turn is appended on drop.

use crate::completion::{resolve_completion_client, CompletionClient, CompletionRequest};
use crate::config::{ChatConfig, DEFAULT_OCR_LANGUAGE};
use crate::error::{ChatError, DispatchError, IngestError};
use crate::ingest::ocr::resolve_ocr_engine;
use crate::ingest::pdf::PdfiumTextExtractor;
use crate::ingest::{input, Ingestor};
use crate::message::{Message, PendingFile, UploadedFile};
use crate::observer::{NoopObserver, ObserverHandle};
use crate::state::{ChatState, DispatchTicket, RequestState};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What a call to [`Orchestrator::send`] did.
#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing to send; no state changed and no request was made.
    Skipped,
    /// The API answered. The reply (or the no-content fallback) is at `reply_index`.
    Replied { reply_index: usize },
    /// The API call failed. The apology turn is at `reply_index`.
    Failed {
        reply_index: usize,
        error: DispatchError,
    },
}

impl SendOutcome {
    pub fn reply_index(&self) -> Option<usize> {
        match self {
            SendOutcome::Skipped => None,
            SendOutcome::Replied { reply_index } | SendOutcome::Failed { reply_index, .. } => {
                Some(*reply_index)
            }
        }
    }
}

/// Owns the conversation and sequences ingestion and dispatch.
pub struct Orchestrator {
    state: ChatState,
    client: Arc<dyn CompletionClient>,
    ingestor: Ingestor,
    observer: ObserverHandle,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
    download_timeout_secs: u64,
}

impl Orchestrator {
    /// Build an orchestrator from `config`.
    ///
    /// Fails fast when the completion backend cannot be created (for example
    /// a missing API key). A missing OCR engine is not fatal: text-only chats
    /// and PDFs still work, and image uploads report the reason.
    pub fn new(config: ChatConfig) -> Result<Self, ChatError> {
        let client = resolve_completion_client(&config)?;

        let ocr = resolve_ocr_engine(&config).map_err(|e| {
            warn!("OCR unavailable, image uploads will fail: {}", e);
            e.to_string()
        });

        let pdf = config
            .pdf_extractor
            .clone()
            .unwrap_or_else(|| Arc::new(PdfiumTextExtractor));

        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));

        Ok(Self {
            state: ChatState::new(),
            client,
            ingestor: Ingestor::new(pdf, ocr, DEFAULT_OCR_LANGUAGE),
            observer,
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            download_timeout_secs: config.download_timeout_secs,
        })
    }

    /// Continue an existing conversation.
    pub fn with_transcript(mut self, transcript: Vec<Message>) -> Self {
        self.state = ChatState::with_transcript(transcript);
        self
    }

    // ── Read access ──────────────────────────────────────────────────────

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn transcript(&self) -> &[Message] {
        self.state.transcript()
    }

    pub fn input(&self) -> &str {
        self.state.input()
    }

    pub fn pending_file(&self) -> Option<&PendingFile> {
        self.state.pending_file()
    }

    pub fn request_state(&self) -> RequestState {
        self.state.request_state()
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn completion_client(&self) -> Arc<dyn CompletionClient> {
        Arc::clone(&self.client)
    }

    // ── Input ────────────────────────────────────────────────────────────

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.set_input(text);
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Load a local path or URL as an upload, using the configured timeout.
    pub async fn load_upload(&self, path_or_url: &str) -> Result<UploadedFile, ChatError> {
        input::load_upload(path_or_url, self.download_timeout_secs).await
    }

    /// Extract `file`'s text and stage it for the next message.
    ///
    /// On failure the error line is set and any previously staged file is
    /// kept. The same error is also returned so callers can log it.
    pub async fn ingest_file(&mut self, file: UploadedFile) -> Result<(), IngestError> {
        self.state.start_ingestion()?;
        self.observer.on_error_changed(None);
        self.notify_request_state();

        let start = Instant::now();
        match self.ingestor.extract(&file).await {
            Ok(text) => {
                let staged = self
                    .state
                    .ingestion_succeeded(PendingFile::from_upload(file, text));
                info!(
                    "Staged '{}' ({} chars extracted) in {:?}",
                    staged.original_name,
                    staged.extracted_text.chars().count(),
                    start.elapsed()
                );
                self.observer.on_file_staged(staged);
                self.notify_request_state();
                Ok(())
            }
            Err(e) => {
                match &e {
                    IngestError::UnsupportedFileType { mime_type } => {
                        info!("Rejected upload '{}': unsupported type {}", file.name, mime_type)
                    }
                    other => warn!("File processing error: {}", other),
                }
                self.state.ingestion_failed(&e);
                self.observer.on_error_changed(self.state.error());
                self.notify_request_state();
                Err(e)
            }
        }
    }

    /// Drop the staged file and clear the error line.
    pub fn clear_file(&mut self) {
        let had_file = self.state.pending_file().is_some();
        let had_error = self.state.error().is_some();
        self.state.clear_file();
        if had_file {
            self.observer.on_file_cleared();
        }
        if had_error {
            self.observer.on_error_changed(None);
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    /// Append the user message and open a dispatch.
    ///
    /// `Ok(None)` when there is nothing to send.
    pub fn begin_send(&mut self) -> Result<Option<DispatchTicket>, ChatError> {
        let had_file = self.state.pending_file().is_some();

        let Some(ticket) = self.state.start_send()? else {
            debug!("Nothing to send");
            return Ok(None);
        };

        let index = ticket.user_index();
        self.observer
            .on_message_appended(index, &self.state.transcript()[index]);
        if had_file {
            self.observer.on_file_cleared();
        }
        self.notify_request_state();
        Ok(Some(ticket))
    }

    /// The request body for an open dispatch.
    pub fn request_for(&self, ticket: &DispatchTicket) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: ticket.payload().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Close a dispatch with the completion result.
    ///
    /// Exactly one assistant message is appended either way, and the sending
    /// flag is cleared last. A ticket that is not this orchestrator's open
    /// dispatch fails with [`ChatError::StaleDispatch`] and changes nothing.
    pub fn finish_send(
        &mut self,
        ticket: DispatchTicket,
        result: Result<Option<String>, DispatchError>,
    ) -> Result<SendOutcome, ChatError> {
        let outcome = match result {
            Ok(reply) => {
                if reply.is_none() {
                    warn!("Completion API returned no usable content");
                }
                SendOutcome::Replied {
                    reply_index: self.state.send_succeeded(ticket, reply)?,
                }
            }
            Err(error) => {
                let reply_index = self.state.send_failed(ticket)?;
                error!("Completion API error: {}", error);
                SendOutcome::Failed { reply_index, error }
            }
        };

        if let Some(index) = outcome.reply_index() {
            self.observer
                .on_message_appended(index, &self.state.transcript()[index]);
        }
        self.notify_request_state();
        Ok(outcome)
    }

    /// Close the open dispatch without a reply, appending the apology turn.
    ///
    /// Returns the apology's index, or `None` when no dispatch is open.
    pub fn abandon_send(&mut self) -> Option<usize> {
        abandon_open_dispatch(&mut self.state, &self.observer)
    }

    /// Send the current input (plus any staged file text) and await the reply.
    pub async fn send(&mut self) -> Result<SendOutcome, ChatError> {
        let Some(ticket) = self.begin_send()? else {
            return Ok(SendOutcome::Skipped);
        };

        let request = self.request_for(&ticket);
        info!(
            "Sending {} messages to {} (model {})",
            request.messages.len(),
            self.client.name(),
            request.model
        );

        let start = Instant::now();
        let guard = OpenDispatch {
            state: &mut self.state,
            observer: &self.observer,
            armed: true,
        };
        let result = self.client.complete(&request).await;
        guard.disarm();
        debug!("Completion round trip: {:?}", start.elapsed());

        self.finish_send(ticket, result)
    }

    /// Replace the input with `text` and send it.
    pub async fn send_message(&mut self, text: impl Into<String>) -> Result<SendOutcome, ChatError> {
        self.set_input(text);
        self.send().await
    }

    fn notify_request_state(&self) {
        self.observer
            .on_request_state_changed(self.state.request_state());
    }
}

/// Closes the dispatch if `send` is dropped while awaiting the reply.
struct OpenDispatch<'a> {
    state: &'a mut ChatState,
    observer: &'a ObserverHandle,
    armed: bool,
}

impl OpenDispatch<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OpenDispatch<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Send cancelled before the completion API answered");
            abandon_open_dispatch(self.state, self.observer);
        }
    }
}

fn abandon_open_dispatch(state: &mut ChatState, observer: &ObserverHandle) -> Option<usize> {
    let index = state.abandon_send()?;
    observer.on_message_appended(index, &state.transcript()[index]);
    observer.on_request_state_changed(state.request_state());
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::WireMessage;
    use crate::error::ExtractError;
    use crate::ingest::ocr::{OcrEngine, OcrWorker};
    use futures::future::BoxFuture;
    use std::sync::Mutex;
    use std::time::Duration;

    struct BrokenOcr;

    impl OcrEngine for BrokenOcr {
        fn name(&self) -> &str {
            "broken"
        }

        fn create_worker<'a>(
            &'a self,
            _language: &'a str,
        ) -> BoxFuture<'a, Result<Box<dyn OcrWorker>, ExtractError>> {
            Box::pin(async {
                Err(ExtractError::NoOcrEngine {
                    hint: "test engine".into(),
                })
            })
        }
    }

    struct Scripted {
        replies: Mutex<Vec<Result<Option<String>, DispatchError>>>,
        seen: Mutex<Vec<Vec<WireMessage>>>,
    }

    impl CompletionClient for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn complete<'a>(
            &'a self,
            request: &'a CompletionRequest,
        ) -> BoxFuture<'a, Result<Option<String>, DispatchError>> {
            self.seen.lock().unwrap().push(request.messages.clone());
            let next = self.replies.lock().unwrap().remove(0);
            Box::pin(async move { next })
        }
    }

    fn orchestrator(replies: Vec<Result<Option<String>, DispatchError>>) -> (Orchestrator, Arc<Scripted>) {
        let client = Arc::new(Scripted {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        });
        let config = ChatConfig::builder()
            .completion_client(client.clone())
            .ocr_engine(Arc::new(BrokenOcr))
            .build()
            .unwrap();
        (Orchestrator::new(config).unwrap(), client)
    }

    #[test]
    fn new_fails_fast_without_credential() {
        let err = Orchestrator::new(ChatConfig::default()).err().unwrap();
        assert!(matches!(err, ChatError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn two_phase_send_rejects_concurrent_dispatch() {
        let (mut orch, _) = orchestrator(vec![]);
        orch.set_input("first");
        let ticket = orch.begin_send().unwrap().unwrap();
        assert!(orch.request_state().is_sending_message);

        orch.set_input("second");
        assert!(matches!(orch.begin_send(), Err(ChatError::Busy { .. })));

        let outcome = orch.finish_send(ticket, Ok(Some("done".into()))).unwrap();
        assert_eq!(outcome.reply_index(), Some(1));
        assert!(!orch.request_state().is_sending_message);
        assert_eq!(orch.transcript().len(), 2);
        assert_eq!(orch.input(), "second");
    }

    #[tokio::test]
    async fn request_carries_model_and_payload() {
        let (mut orch, _) = orchestrator(vec![]);
        orch.set_input("Hello");
        let ticket = orch.begin_send().unwrap().unwrap();
        let req = orch.request_for(&ticket);
        assert_eq!(req.model, "llama-3.3-70b-versatile");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].content, "Hello");
        orch.finish_send(ticket, Ok(None)).unwrap();
    }

    #[tokio::test]
    async fn image_upload_with_failing_ocr_is_processing_error() {
        let (mut orch, _) = orchestrator(vec![]);
        let err = orch
            .ingest_file(UploadedFile::new("scan.png", "image/png", vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::FileProcessing { .. }), "got {err:?}");
        assert_eq!(
            orch.error(),
            Some(crate::prompts::FILE_PROCESSING_MESSAGE)
        );
        assert!(orch.pending_file().is_none());
        assert!(!orch.request_state().is_ingesting_file);
    }

    #[tokio::test]
    async fn failed_dispatch_reports_error_in_outcome() {
        let (mut orch, client) =
            orchestrator(vec![Err(DispatchError::Transport("connection reset".into()))]);
        let outcome = orch.send_message("Hi").await.unwrap();
        match outcome {
            SendOutcome::Failed { reply_index, error } => {
                assert_eq!(reply_index, 1);
                assert!(matches!(error, DispatchError::Transport(_)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(client.seen.lock().unwrap().len(), 1);
    }

    struct Stalled;

    impl CompletionClient for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        fn complete<'a>(
            &'a self,
            _request: &'a CompletionRequest,
        ) -> BoxFuture<'a, Result<Option<String>, DispatchError>> {
            Box::pin(futures::future::pending())
        }
    }

    #[tokio::test]
    async fn dropped_send_appends_apology_and_clears_flag() {
        let (mut orch, _) = orchestrator(vec![Ok(Some("second reply".into()))]);
        let scripted = std::mem::replace(&mut orch.client, Arc::new(Stalled));

        orch.set_input("never answered");
        let timed_out = tokio::time::timeout(Duration::from_millis(20), orch.send()).await;
        assert!(timed_out.is_err());

        assert_eq!(orch.transcript().len(), 2);
        assert_eq!(orch.transcript()[0].content, "never answered");
        assert_eq!(orch.transcript()[1].content, crate::prompts::DISPATCH_FAILURE_REPLY);
        assert!(orch.request_state().is_idle());

        orch.client = scripted;
        let outcome = orch.send_message("again").await.unwrap();
        assert_eq!(outcome.reply_index(), Some(3));
        assert_eq!(orch.transcript()[3].content, "second reply");
    }

    #[tokio::test]
    async fn lost_ticket_is_abandoned_then_rejected() {
        let (mut orch, _) = orchestrator(vec![]);
        assert_eq!(orch.abandon_send(), None);

        orch.set_input("first");
        let ticket = orch.begin_send().unwrap().unwrap();
        assert_eq!(orch.abandon_send(), Some(1));

        let err = orch.finish_send(ticket, Ok(Some("late".into()))).unwrap_err();
        assert!(matches!(err, ChatError::StaleDispatch));
        assert_eq!(orch.transcript().len(), 2);
    }

    #[tokio::test]
    async fn ticket_from_other_orchestrator_is_rejected() {
        let (mut a, _) = orchestrator(vec![]);
        let (mut b, _) = orchestrator(vec![]);
        a.set_input("for a");
        let foreign = a.begin_send().unwrap().unwrap();

        let err = b.finish_send(foreign, Ok(Some("stray".into()))).unwrap_err();
        assert!(matches!(err, ChatError::StaleDispatch));
        assert!(b.transcript().is_empty());
        assert!(a.request_state().is_sending_message);
    }

    #[tokio::test]
    async fn image_ocr_runs_in_english() {
        struct LanguageSpy(Mutex<Vec<String>>);

        impl OcrEngine for LanguageSpy {
            fn name(&self) -> &str {
                "spy"
            }

            fn create_worker<'a>(
                &'a self,
                language: &'a str,
            ) -> BoxFuture<'a, Result<Box<dyn OcrWorker>, ExtractError>> {
                self.0.lock().unwrap().push(language.to_string());
                Box::pin(async {
                    Err(ExtractError::NoOcrEngine {
                        hint: "spy".into(),
                    })
                })
            }
        }

        let spy = Arc::new(LanguageSpy(Mutex::new(Vec::new())));
        let config = ChatConfig::builder()
            .completion_client(Arc::new(Stalled))
            .ocr_engine(spy.clone())
            .build()
            .unwrap();
        let mut orch = Orchestrator::new(config).unwrap();
        let _ = orch
            .ingest_file(UploadedFile::new("scan.png", "image/png", vec![1, 2, 3]))
            .await;
        assert_eq!(*spy.0.lock().unwrap(), vec!["eng".to_string()]);
    }
}
