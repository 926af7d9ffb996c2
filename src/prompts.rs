//! Prompts and fixed user-facing strings.
//!
//! Everything a user can read verbatim, or a model receives as instructions,
//! lives here so tests can assert against the same constants the code uses.

/// Marker line placed before staged file text in a composed user message.
pub const FILE_CONTENT_MARKER: &str = "**File Content:**";

/// Assistant turn appended when the completion API returned no usable content.
pub const NO_RESPONSE_REPLY: &str = "No response received.";

/// Assistant turn appended when the completion call failed.
pub const DISPATCH_FAILURE_REPLY: &str = "Something went wrong. Please try again!";

/// Error string shown for a file whose type is neither PDF nor image.
pub const UNSUPPORTED_FILE_TYPE_MESSAGE: &str = "Unsupported file type";

/// Error string shown when extraction failed for any reason.
pub const FILE_PROCESSING_MESSAGE: &str = "Error processing file. Please try again.";

/// System prompt for the vision OCR engine.
///
/// The placeholder `{language}` is replaced with the configured OCR language
/// (an ISO 639-2 code such as `eng`).
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe every piece of text visible in the image.

Rules:
- Recognise text in the language with ISO 639-2 code "{language}"
- Preserve the reading order and line breaks as they appear
- Do NOT describe the image, translate, summarise or add commentary
- Do NOT wrap the output in code fences
- If the image contains no text, output nothing at all"#;

/// Build the OCR system prompt for `language`.
pub fn ocr_system_prompt(language: &str) -> String {
    OCR_SYSTEM_PROMPT.replace("{language}", language)
}
