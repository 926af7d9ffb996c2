//! Configuration for the conversation orchestrator.
//!
//! Every knob lives in [`ChatConfig`], built via [`ChatConfigBuilder`].
//! Collaborators (completion client, OCR engine, PDF extractor, observer)
//! can be injected pre-built; anything left unset is resolved from the
//! remaining fields when the orchestrator is constructed.

use crate::completion::CompletionClient;
use crate::error::ChatError;
use crate::ingest::ocr::OcrEngine;
use crate::ingest::pdf::PdfTextExtractor;
use crate::observer::ObserverHandle;
use std::fmt;
use std::sync::Arc;

/// Model used for chat completions unless overridden.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// OpenAI-compatible endpoint of the Groq API.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Language the OCR pass is configured for.
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

/// Env var holding the completion API credential.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Configuration for an [`crate::orchestrator::Orchestrator`].
///
/// # Example
/// ```rust
/// use docchat::ChatConfig;
///
/// let config = ChatConfig::builder()
///     .api_key("gsk_test")
///     .model("llama-3.1-8b-instant")
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "llama-3.1-8b-instant");
/// ```
#[derive(Clone)]
pub struct ChatConfig {
    /// Completion model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Credential for the HTTP completion backend.
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible completion endpoint. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Route completions through this edgequake-llm provider instead of the
    /// HTTP backend (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed completion client. Takes precedence over everything else.
    pub completion_client: Option<Arc<dyn CompletionClient>>,

    /// Sampling temperature. `None` leaves it to the API default.
    pub temperature: Option<f32>,

    /// Cap on generated tokens per reply. `None` leaves it to the API default.
    pub max_tokens: Option<usize>,

    /// Per-request timeout for the completion call, in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// edgequake-llm provider used by the vision OCR engine.
    /// If None, `EDGEQUAKE_LLM_PROVIDER`/`EDGEQUAKE_MODEL` or auto-detection is used.
    pub ocr_provider_name: Option<String>,

    /// Vision model used for OCR. Default: provider default.
    pub ocr_model: Option<String>,

    /// Pre-constructed OCR engine. Takes precedence over the OCR provider fields.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Pre-constructed PDF text extractor. Default: pdfium.
    pub pdf_extractor: Option<Arc<dyn PdfTextExtractor>>,

    /// Receives UI-facing state changes.
    pub observer: Option<ObserverHandle>,

    /// Download timeout for URL uploads in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            provider_name: None,
            completion_client: None,
            temperature: None,
            max_tokens: None,
            request_timeout_secs: 60,
            ocr_provider_name: None,
            ocr_model: None,
            ocr_engine: None,
            pdf_extractor: None,
            observer: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("provider_name", &self.provider_name)
            .field(
                "completion_client",
                &self.completion_client.as_ref().map(|_| "<dyn CompletionClient>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("ocr_provider_name", &self.ocr_provider_name)
            .field("ocr_model", &self.ocr_model)
            .field("ocr_engine", &self.ocr_engine.as_ref().map(|_| "<dyn OcrEngine>"))
            .field(
                "pdf_extractor",
                &self.pdf_extractor.as_ref().map(|_| "<dyn PdfTextExtractor>"),
            )
            .finish()
    }
}

impl ChatConfig {
    /// Create a new builder for `ChatConfig`.
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether completions go through the HTTP backend and so need `api_key`.
    pub fn needs_api_key(&self) -> bool {
        self.completion_client.is_none() && self.provider_name.is_none()
    }
}

/// Builder for [`ChatConfig`].
#[derive(Debug)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    /// Seed the builder from `GROQ_API_KEY`, `DOCCHAT_MODEL` and `DOCCHAT_BASE_URL`.
    ///
    /// Empty variables are ignored.
    pub fn from_env(mut self) -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        if let Some(key) = read(API_KEY_ENV) {
            self.config.api_key = Some(key);
        }
        if let Some(model) = read("DOCCHAT_MODEL") {
            self.config.model = model;
        }
        if let Some(url) = read("DOCCHAT_BASE_URL") {
            self.config.base_url = url;
        }
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn completion_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.config.completion_client = Some(client);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n.max(1));
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn ocr_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.ocr_provider_name = Some(name.into());
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = Some(model.into());
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn pdf_extractor(mut self, extractor: Arc<dyn PdfTextExtractor>) -> Self {
        self.config.pdf_extractor = Some(extractor);
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Fails with [`ChatError::MissingCredential`] when completions would go
    /// through the HTTP backend and no API key is set.
    pub fn build(self) -> Result<ChatConfig, ChatError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ChatError::InvalidConfig("model must not be empty".into()));
        }
        if c.request_timeout_secs == 0 {
            return Err(ChatError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.needs_api_key() {
            if c.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(ChatError::MissingCredential {
                    env_var: API_KEY_ENV,
                });
            }
            if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
                return Err(ChatError::InvalidConfig(format!(
                    "base URL must be http(s), got '{}'",
                    c.base_url
                )));
            }
        }
        Ok(self.config)
    }
}
