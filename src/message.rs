//! Conversation data model: messages, attachments and staged files.
//!
//! A [`Message`] is immutable once it has been appended to the transcript.
//! Files travel through two shapes: an [`UploadedFile`] is what the user
//! picked, a [`PendingFile`] is that file after its text has been extracted
//! and it is waiting to be folded into the next user message.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Never sent to the completion API.
    System,
}

impl Role {
    /// Whether entries with this role are part of the outbound payload.
    pub fn is_conversational(self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Preview handles ──────────────────────────────────────────────────────

static NEXT_BLOB_ID: AtomicU64 = AtomicU64::new(1);

struct PreviewBlob {
    id: u64,
    mime_type: String,
    bytes: Vec<u8>,
}

/// Opaque, cheaply clonable reference to the bytes of an uploaded file.
///
/// Every clone points at the same blob, so a message that carries a handle
/// keeps the original bytes alive for as long as the message exists.
#[derive(Clone)]
pub struct PreviewHandle(Arc<PreviewBlob>);

impl PreviewHandle {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self(Arc::new(PreviewBlob {
            id: NEXT_BLOB_ID.fetch_add(1, Ordering::Relaxed),
            mime_type: mime_type.into(),
            bytes,
        }))
    }

    /// Locally resolvable URI for this blob, e.g. `blob:docchat/7`.
    pub fn uri(&self) -> String {
        format!("blob:docchat/{}", self.0.id)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.0.mime_type
    }

    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    /// True when both handles point at the same blob.
    pub fn same_blob(&self, other: &PreviewHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("uri", &self.uri())
            .field("mime_type", &self.0.mime_type)
            .field("len", &self.0.bytes.len())
            .finish()
    }
}

impl Serialize for PreviewHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.uri())
    }
}

// ── Messages ─────────────────────────────────────────────────────────────

/// A file reference carried by a user message.
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub file_name: String,
    pub preview: PreviewHandle,
}

impl Attachment {
    pub fn mime_type(&self) -> &str {
        self.preview.mime_type()
    }
}

/// One transcript entry.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachment: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachment: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn attached_file_ref(&self) -> Option<&PreviewHandle> {
        self.attachment.as_ref().map(|a| &a.preview)
    }

    pub fn attached_file_name(&self) -> Option<&str> {
        self.attachment.as_ref().map(|a| a.file_name.as_str())
    }
}

// ── Files ────────────────────────────────────────────────────────────────

/// What a declared media type routes to during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image,
}

impl FileKind {
    /// Classify a declared media type. `None` means unsupported.
    pub fn classify(mime_type: &str) -> Option<FileKind> {
        if mime_type == "application/pdf" {
            Some(FileKind::Pdf)
        } else if mime_type.starts_with("image/") {
            Some(FileKind::Image)
        } else {
            None
        }
    }
}

/// A file as selected by the user, before any extraction.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

/// A file whose text has been extracted, waiting for the next send.
#[derive(Debug, Clone, Serialize)]
pub struct PendingFile {
    pub mime_type: String,
    pub preview: PreviewHandle,
    pub extracted_text: String,
    pub original_name: String,
}

impl PendingFile {
    /// Build the staged file, moving the upload's bytes behind a preview handle.
    pub fn from_upload(file: UploadedFile, extracted_text: String) -> Self {
        let preview = PreviewHandle::new(file.bytes, file.mime_type.clone());
        Self {
            mime_type: file.mime_type,
            preview,
            extracted_text,
            original_name: file.name,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.extracted_text.is_empty()
    }

    /// The first `max_chars` characters of the extracted text.
    pub fn excerpt(&self, max_chars: usize) -> &str {
        match self.extracted_text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => &self.extracted_text[..byte_idx],
            None => &self.extracted_text,
        }
    }

    pub fn attachment(&self) -> Attachment {
        Attachment {
            file_name: self.original_name.clone(),
            preview: self.preview.clone(),
        }
    }
}
