//! OCR for image uploads.
//!
//! An [`OcrEngine`] hands out [`OcrWorker`]s configured for one language. A
//! worker is acquired per file and must be terminated afterwards whether
//! recognition succeeded or not; [`recognize_image`] is the one place that
//! sequence lives.
//!
//! The shipped engine, [`VisionOcrEngine`], reads images the way a
//! vision-language model does: the upload is decoded, re-encoded as a
//! lossless PNG, base64-wrapped and sent with a transcription prompt.
//!
//! A recognition makes exactly one provider call. A failure surfaces as
//! [`ExtractError::Ocr`] and the user re-uploads to try again.

use crate::config::ChatConfig;
use crate::error::{ChatError, ExtractError};
use crate::prompts::ocr_system_prompt;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Vision model used for OCR when a provider is named without a model.
pub const DEFAULT_OCR_MODEL: &str = "gpt-4.1-nano";

/// A single-language OCR session.
pub trait OcrWorker: Send {
    /// Recognise the text in one image.
    fn recognize<'a>(
        &'a mut self,
        image: &'a [u8],
        mime_type: &'a str,
    ) -> BoxFuture<'a, Result<String, ExtractError>>;

    /// Release everything the worker holds.
    fn terminate(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Creates OCR workers.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn create_worker<'a>(
        &'a self,
        language: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn OcrWorker>, ExtractError>>;
}

/// Acquire a worker, recognise `image`, and terminate the worker on every path.
pub async fn recognize_image(
    engine: &dyn OcrEngine,
    language: &str,
    image: &[u8],
    mime_type: &str,
) -> Result<String, ExtractError> {
    let mut worker = engine.create_worker(language).await?;
    let result = worker.recognize(image, mime_type).await;
    worker.terminate().await;
    result
}

// ── Vision-model engine ──────────────────────────────────────────────────

/// OCR engine backed by an `edgequake-llm` vision provider.
pub struct VisionOcrEngine {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl VisionOcrEngine {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

impl OcrEngine for VisionOcrEngine {
    fn name(&self) -> &str {
        &self.label
    }

    fn create_worker<'a>(
        &'a self,
        language: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn OcrWorker>, ExtractError>> {
        Box::pin(async move {
            debug!("OCR worker created ({}, lang={})", self.label, language);
            let worker: Box<dyn OcrWorker> = Box::new(VisionOcrWorker {
                provider: Some(Arc::clone(&self.provider)),
                system_prompt: ocr_system_prompt(language),
                recognized: 0,
            });
            Ok(worker)
        })
    }
}

struct VisionOcrWorker {
    provider: Option<Arc<dyn LLMProvider>>,
    system_prompt: String,
    recognized: usize,
}

impl VisionOcrWorker {
    async fn run(&mut self, image: &[u8], mime_type: &str) -> Result<String, ExtractError> {
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| ExtractError::Task("OCR worker already terminated".into()))?;

        let start = Instant::now();
        let owned = image.to_vec();
        let image_data = tokio::task::spawn_blocking(move || encode_for_vision(&owned))
            .await
            .map_err(|e| ExtractError::Task(format!("Image encode task panicked: {}", e)))??;
        debug!("OCR input {} → PNG in {:?}", mime_type, start.elapsed());

        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(4096),
            ..Default::default()
        };

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| {
                warn!("OCR: {} failed: {}", mime_type, e);
                ExtractError::Ocr {
                    detail: e.to_string(),
                }
            })?;

        self.recognized += 1;
        debug!(
            "OCR: {} output tokens in {:?}",
            response.completion_tokens,
            start.elapsed()
        );
        Ok(clean_ocr_text(&response.content))
    }
}

impl OcrWorker for VisionOcrWorker {
    fn recognize<'a>(
        &'a mut self,
        image: &'a [u8],
        mime_type: &'a str,
    ) -> BoxFuture<'a, Result<String, ExtractError>> {
        Box::pin(self.run(image, mime_type))
    }

    fn terminate(mut self: Box<Self>) -> BoxFuture<'static, ()> {
        let provider = self.provider.take();
        let recognized = self.recognized;
        Box::pin(async move {
            drop(provider);
            debug!("OCR worker terminated after {} recognitions", recognized);
        })
    }
}

/// Decode the upload and re-encode it as a base64 PNG for the vision API.
///
/// PNG is lossless: JPEG artefacts around glyph edges cost OCR accuracy.
/// Decoding first also rejects bytes that are not an image at all.
pub fn encode_for_vision(bytes: &[u8]) -> Result<ImageData, ExtractError> {
    let img: DynamicImage = image::load_from_memory(bytes)?;
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-z]*\n(.*)\n```$").unwrap());

/// Undo the wrappers vision models add despite instructions: outer code
/// fences and CRLF line endings.
pub fn clean_ocr_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n");
    let trimmed = text.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

/// Resolve the OCR engine, from most-specific to least-specific:
///
/// 1. **Pre-built engine** (`config.ocr_engine`).
/// 2. **Named provider** (`config.ocr_provider_name` + `config.ocr_model`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_ocr_engine(config: &ChatConfig) -> Result<Arc<dyn OcrEngine>, ChatError> {
    if let Some(ref engine) = config.ocr_engine {
        return Ok(Arc::clone(engine));
    }

    let wrap = |provider: Arc<dyn LLMProvider>, label: String| -> Arc<dyn OcrEngine> {
        info!("OCR via {}", label);
        Arc::new(VisionOcrEngine::new(provider, label))
    };

    if let Some(ref name) = config.ocr_provider_name {
        let model = config.ocr_model.as_deref().unwrap_or(DEFAULT_OCR_MODEL);
        let provider = create_vision_provider(name, model)?;
        return Ok(wrap(provider, format!("{name}/{model}")));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            let provider = create_vision_provider(&prov, &model)?;
            return Ok(wrap(provider, format!("{prov}/{model}")));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.ocr_model.as_deref().unwrap_or(DEFAULT_OCR_MODEL);
            let provider = create_vision_provider("openai", model)?;
            return Ok(wrap(provider, format!("openai/{model}")));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ChatError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider for OCR could be auto-detected from environment.\n\
                Set OPENAI_API_KEY or pass --ocr-provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(wrap(llm_provider, "auto".to_string()))
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ChatError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ChatError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::{LLMResponse, LlmError};
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn encode_for_vision_produces_png_base64() {
        let data = encode_for_vision(&png_bytes()).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[..4], b"\x89PNG");
    }

    #[test]
    fn encode_for_vision_rejects_garbage() {
        let err = encode_for_vision(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ExtractError::ImageDecode(_)), "got {err:?}");
    }

    #[test]
    fn clean_ocr_text_strips_fences_and_crlf() {
        assert_eq!(clean_ocr_text("```\nINVOICE\r\nTotal: 5\n```"), "INVOICE\nTotal: 5");
        assert_eq!(clean_ocr_text("```text\nhello\n```\n"), "hello");
        assert_eq!(clean_ocr_text("  plain text \n"), "plain text");
        assert_eq!(clean_ocr_text(""), "");
    }

    struct CountingEngine {
        created: Arc<AtomicUsize>,
        terminated: Arc<AtomicUsize>,
        fail: bool,
    }

    struct CountingWorker {
        terminated: Arc<AtomicUsize>,
        fail: bool,
    }

    impl OcrWorker for CountingWorker {
        fn recognize<'a>(
            &'a mut self,
            _image: &'a [u8],
            _mime_type: &'a str,
        ) -> BoxFuture<'a, Result<String, ExtractError>> {
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(ExtractError::Ocr {
                        detail: "engine crashed".into(),
                    })
                } else {
                    Ok("recognised".into())
                }
            })
        }

        fn terminate(self: Box<Self>) -> BoxFuture<'static, ()> {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    impl OcrEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }

        fn create_worker<'a>(
            &'a self,
            language: &'a str,
        ) -> BoxFuture<'a, Result<Box<dyn OcrWorker>, ExtractError>> {
            assert_eq!(language, "eng");
            self.created.fetch_add(1, Ordering::SeqCst);
            let worker: Box<dyn OcrWorker> = Box::new(CountingWorker {
                terminated: Arc::clone(&self.terminated),
                fail: self.fail,
            });
            Box::pin(async move { Ok(worker) })
        }
    }

    #[tokio::test]
    async fn worker_is_terminated_on_success_and_failure() {
        for fail in [false, true] {
            let engine = CountingEngine {
                created: Arc::new(AtomicUsize::new(0)),
                terminated: Arc::new(AtomicUsize::new(0)),
                fail,
            };
            let result = recognize_image(&engine, "eng", b"img", "image/png").await;
            assert_eq!(result.is_err(), fail);
            assert_eq!(engine.created.load(Ordering::SeqCst), 1);
            assert_eq!(engine.terminated.load(Ordering::SeqCst), 1);
        }
    }

    struct FailingVision {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LLMProvider for FailingVision {
        fn name(&self) -> &str {
            "failing"
        }

        fn model(&self) -> &str {
            "failing-vision"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            Err(LlmError::ApiError("503 overloaded".into()))
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::ApiError("503 overloaded".into()))
        }
    }

    #[tokio::test]
    async fn vision_failure_calls_provider_once() {
        let provider = Arc::new(FailingVision {
            calls: AtomicUsize::new(0),
        });
        let engine = VisionOcrEngine::new(provider.clone(), "failing/failing-vision");

        let err = recognize_image(&engine, "eng", &png_bytes(), "image/png")
            .await
            .unwrap_err();

        match err {
            ExtractError::Ocr { detail } => assert!(detail.contains("503"), "got {detail}"),
            other => panic!("expected OCR error, got {other:?}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolve_prefers_prebuilt_engine() {
        let engine: Arc<dyn OcrEngine> = Arc::new(CountingEngine {
            created: Arc::new(AtomicUsize::new(0)),
            terminated: Arc::new(AtomicUsize::new(0)),
            fail: false,
        });
        let config = ChatConfig::builder()
            .api_key("k")
            .ocr_engine(Arc::clone(&engine))
            .build()
            .unwrap();
        let resolved = resolve_ocr_engine(&config).unwrap();
        assert_eq!(resolved.name(), "counting");
    }
}
