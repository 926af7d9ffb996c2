//! Completion API collaborators.
//!
//! The orchestrator only needs one thing from a completion backend: given the
//! conversation so far, produce the assistant's next reply (or nothing usable).
//! [`CompletionClient`] captures that contract; two implementations ship:
//!
//! * [`HttpCompletionClient`] — talks to any OpenAI-compatible
//!   `/chat/completions` endpoint (Groq by default) and reads the first
//!   choice's message content.
//! * [`ProviderCompletionClient`] — adapts an `edgequake-llm` provider so any
//!   provider the factory knows (OpenAI, Anthropic, Gemini, Ollama, …) can
//!   stand in for the HTTP backend.

use crate::config::ChatConfig;
use crate::error::{ChatError, DispatchError};
use crate::message::{Message, Role};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One `{role, content}` entry of the outbound payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

/// Body of a chat-completion request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

/// Map the transcript to the outbound payload.
///
/// Only user and assistant entries are sent; order is preserved.
pub fn build_payload(history: &[Message]) -> Vec<WireMessage> {
    history
        .iter()
        .filter(|m| m.role.is_conversational())
        .map(|m| WireMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}

/// A backend that turns a conversation into the assistant's next reply.
///
/// `Ok(None)` means the call succeeded but produced no usable content.
pub trait CompletionClient: Send + Sync {
    /// Short label for logs, e.g. `groq` or `openai/gpt-4.1-mini`.
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<Option<String>, DispatchError>>;
}

// ── OpenAI-compatible HTTP backend ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    fn first_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
}

impl HttpCompletionClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ChatError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &CompletionRequest) -> Result<Option<String>, DispatchError> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    DispatchError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(DispatchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| DispatchError::Malformed(e.to_string()))?;

        debug!(
            "Completion from {} in {:?} ({} bytes)",
            self.endpoint,
            start.elapsed(),
            body.len()
        );
        Ok(parsed.first_content())
    }
}

impl CompletionClient for HttpCompletionClient {
    fn name(&self) -> &str {
        &self.endpoint
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<Option<String>, DispatchError>> {
        Box::pin(self.post(request))
    }
}

// ── edgequake-llm provider backend ───────────────────────────────────────

/// Adapts an `edgequake-llm` provider to [`CompletionClient`].
///
/// The provider is bound to its model at construction, so
/// `CompletionRequest::model` is informational here.
pub struct ProviderCompletionClient {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderCompletionClient {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    async fn chat(&self, request: &CompletionRequest) -> Result<Option<String>, DispatchError> {
        let messages: Vec<ChatMessage> = request
            .messages
            .iter()
            .map(|m| match m.role {
                Role::User => ChatMessage::user(&m.content),
                Role::Assistant => ChatMessage::assistant(&m.content),
                Role::System => ChatMessage::system(&m.content),
            })
            .collect();

        let options = CompletionOptions {
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| DispatchError::Provider(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        if response.content.is_empty() {
            Ok(None)
        } else {
            Ok(Some(response.content))
        }
    }
}

impl CompletionClient for ProviderCompletionClient {
    fn name(&self) -> &str {
        &self.label
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<Option<String>, DispatchError>> {
        Box::pin(self.chat(request))
    }
}

/// Resolve the completion backend, from most-specific to least-specific:
///
/// 1. **Pre-built client** (`config.completion_client`) — used as-is.
/// 2. **Named provider** (`config.provider_name`) — created through
///    [`ProviderFactory::create_llm_provider`] with `config.model`.
/// 3. **HTTP backend** — `config.base_url` with `config.api_key`; a missing
///    key fails here rather than at the first send.
pub fn resolve_completion_client(
    config: &ChatConfig,
) -> Result<Arc<dyn CompletionClient>, ChatError> {
    if let Some(ref client) = config.completion_client {
        return Ok(Arc::clone(client));
    }

    if let Some(ref name) = config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            ChatError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        info!("Completions via provider {}/{}", name, config.model);
        return Ok(Arc::new(ProviderCompletionClient::new(
            provider,
            format!("{}/{}", name, config.model),
        )));
    }

    let api_key = config
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or(ChatError::MissingCredential {
            env_var: crate::config::API_KEY_ENV,
        })?;

    let client =
        HttpCompletionClient::new(&config.base_url, api_key, config.request_timeout_secs)?;
    info!("Completions via {}", client.endpoint());
    Ok(Arc::new(client))
}
