//! Plain-text rendering of the conversation for terminal front ends.
//!
//! Attachments render by media type:
//!
//! | Type        | Line                          |
//! |-------------|-------------------------------|
//! | `image/*`   | `[image] <name>`              |
//! | PDF         | `📄 PDF Document: <name>`      |
//! | anything else | the preview handle's URI    |
//!
//! followed in every case by `Uploaded file: <name>`.

use crate::message::{Attachment, FileKind, Message, PendingFile, Role};
use once_cell::sync::Lazy;
use regex::Regex;

/// Characters of extracted text shown in the staged-file preview.
pub const EXCERPT_CHARS: usize = 150;

/// Shown while a send is in flight.
pub const TYPING_INDICATOR: &str = "Assistant is typing...";

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Whether to emit ANSI escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Plain,
    Ansi,
}

static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").unwrap());

/// Render `**x**` spans as terminal bold. Plain style leaves the text as is.
pub fn render_inline(text: &str, style: Style) -> String {
    match style {
        Style::Plain => text.to_string(),
        Style::Ansi => RE_BOLD
            .replace_all(text, format!("{BOLD}$1{RESET}").as_str())
            .into_owned(),
    }
}

/// The lines describing an attachment.
pub fn attachment_lines(attachment: &Attachment) -> [String; 2] {
    let first = match FileKind::classify(attachment.mime_type()) {
        Some(FileKind::Image) => format!("[image] {}", attachment.file_name),
        Some(FileKind::Pdf) => format!("📄 PDF Document: {}", attachment.file_name),
        None => attachment.preview.uri(),
    };
    [first, format!("Uploaded file: {}", attachment.file_name)]
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

/// Render one message: speaker, content, then any attachment lines.
pub fn render_message(message: &Message, style: Style) -> String {
    let mut out = match style {
        Style::Plain => format!("{}:", speaker(message.role)),
        Style::Ansi => format!("{BOLD}{}:{RESET}", speaker(message.role)),
    };

    if !message.content.is_empty() {
        out.push('\n');
        out.push_str(&render_inline(&message.content, style));
    }

    if let Some(attachment) = &message.attachment {
        for line in attachment_lines(attachment) {
            out.push('\n');
            match style {
                Style::Plain => out.push_str(&line),
                Style::Ansi => out.push_str(&format!("{DIM}{line}{RESET}")),
            }
        }
    }
    out
}

/// Render the whole transcript in order, messages separated by a blank line.
pub fn render_transcript(messages: &[Message], style: Style) -> String {
    messages
        .iter()
        .map(|m| render_message(m, style))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Preview of the staged file: name, type, and the start of its text.
pub fn render_pending_file(file: &PendingFile) -> String {
    let mut out = format!("Attached: {} ({})", file.original_name, file.mime_type);
    if file.has_text() {
        out.push_str(&format!(
            "\nExtracted text: {}...",
            file.excerpt(EXCERPT_CHARS)
        ));
    } else {
        out.push_str("\nExtracted text: (none)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{PreviewHandle, UploadedFile};

    fn attachment(name: &str, mime: &str) -> Attachment {
        Attachment {
            file_name: name.into(),
            preview: PreviewHandle::new(vec![1, 2, 3], mime),
        }
    }

    #[test]
    fn attachment_lines_by_type() {
        let [first, second] = attachment_lines(&attachment("scan.png", "image/png"));
        assert_eq!(first, "[image] scan.png");
        assert_eq!(second, "Uploaded file: scan.png");

        let [first, _] = attachment_lines(&attachment("lease.pdf", "application/pdf"));
        assert_eq!(first, "📄 PDF Document: lease.pdf");

        let other = attachment("notes.bin", "application/octet-stream");
        let [first, _] = attachment_lines(&other);
        assert_eq!(first, other.preview.uri());
    }

    #[test]
    fn plain_message_has_speaker_content_and_attachment() {
        let msg = Message::user("Summarise").with_attachment(attachment("a.pdf", "application/pdf"));
        assert_eq!(
            render_message(&msg, Style::Plain),
            "You:\nSummarise\n📄 PDF Document: a.pdf\nUploaded file: a.pdf"
        );
    }

    #[test]
    fn bold_only_in_ansi_style() {
        let text = "a **b** c";
        assert_eq!(render_inline(text, Style::Plain), text);
        assert_eq!(render_inline(text, Style::Ansi), "a \x1b[1mb\x1b[0m c");
    }

    #[test]
    fn transcript_keeps_order() {
        let msgs = vec![Message::user("one"), Message::assistant("two")];
        assert_eq!(
            render_transcript(&msgs, Style::Plain),
            "You:\none\n\nAssistant:\ntwo"
        );
    }

    #[test]
    fn pending_preview_is_truncated() {
        let text = "x".repeat(400);
        let file = PendingFile::from_upload(
            UploadedFile::new("big.pdf", "application/pdf", vec![]),
            text,
        );
        let preview = render_pending_file(&file);
        assert!(preview.starts_with("Attached: big.pdf (application/pdf)"));
        assert!(preview.ends_with(&format!("{}...", "x".repeat(EXCERPT_CHARS))));
        assert!(!preview.contains(&"x".repeat(EXCERPT_CHARS + 1)));
    }
}
