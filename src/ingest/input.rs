//! Upload loading: turn a user-supplied path or URL into an [`UploadedFile`].
//!
//! A browser hands the page a file together with its declared media type.
//! Here the declared type comes from the HTTP `Content-Type` header for URLs
//! and from the file extension for local paths, with a `%PDF` sniff for
//! extension-less files. Ingestion classifies on that declared type only.

use crate::error::ChatError;
use crate::message::UploadedFile;
use std::path::Path;
use tracing::{debug, info};

/// Media type used when nothing better is known.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load an upload from a local path or an HTTP(S) URL.
pub async fn load_upload(input: &str, timeout_secs: u64) -> Result<UploadedFile, ChatError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ChatError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

/// Guess a media type from a file name's extension.
pub fn guess_mime_type(name: &str) -> Option<String> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())?;

    let mime = match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "svg" => "image/svg+xml",
        _ => {
            return image::ImageFormat::from_extension(&ext)
                .map(|f| f.to_mime_type().to_string());
        }
    };
    Some(mime.to_string())
}

/// Declared type for `name`, falling back to sniffing the first bytes.
pub fn declared_mime_type(name: &str, bytes: &[u8]) -> String {
    guess_mime_type(name).unwrap_or_else(|| {
        if bytes.starts_with(b"%PDF") {
            "application/pdf".to_string()
        } else {
            FALLBACK_MIME_TYPE.to_string()
        }
    })
}

/// Read a local file, mapping I/O failures to actionable errors.
async fn load_local(path: &Path) -> Result<UploadedFile, ChatError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ChatError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => ChatError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ChatError::InvalidInput {
            input: format!("{} ({})", path.display(), e),
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = declared_mime_type(&name, &bytes);

    debug!(
        "Loaded local upload: {} ({}, {} bytes)",
        path.display(),
        mime_type,
        bytes.len()
    );
    Ok(UploadedFile::new(name, mime_type, bytes))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<UploadedFile, ChatError> {
    info!("Downloading upload from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ChatError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ChatError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ChatError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ChatError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let header_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(content_type_essence)
        .filter(|m| !m.is_empty() && m != FALLBACK_MIME_TYPE);

    let name = extract_filename(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ChatError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    let mime_type = header_mime.unwrap_or_else(|| declared_mime_type(&name, &bytes));
    info!("Downloaded {} bytes ({})", bytes.len(), mime_type);

    Ok(UploadedFile::new(name, mime_type, bytes))
}

/// `"application/pdf; charset=binary"` → `"application/pdf"`.
fn content_type_essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "download".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn guesses_common_types() {
        assert_eq!(guess_mime_type("a.PDF").as_deref(), Some("application/pdf"));
        assert_eq!(guess_mime_type("scan.png").as_deref(), Some("image/png"));
        assert_eq!(guess_mime_type("photo.jpg").as_deref(), Some("image/jpeg"));
        assert_eq!(guess_mime_type("notes.txt").as_deref(), Some("text/plain"));
        assert_eq!(guess_mime_type("README"), None);
    }

    #[test]
    fn sniffs_pdf_without_extension() {
        assert_eq!(declared_mime_type("upload", b"%PDF-1.4 ..."), "application/pdf");
        assert_eq!(declared_mime_type("upload", b"hello"), FALLBACK_MIME_TYPE);
    }

    #[test]
    fn content_type_parameters_are_dropped() {
        assert_eq!(
            content_type_essence("Application/PDF; charset=binary"),
            "application/pdf"
        );
    }

    #[test]
    fn filename_from_url() {
        assert_eq!(extract_filename("https://x.org/files/lease.pdf"), "lease.pdf");
        assert_eq!(extract_filename("https://x.org/"), "download");
    }

    #[tokio::test]
    async fn loads_local_file_with_declared_type() {
        let mut tmp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        tmp.write_all(b"\x89PNG....").unwrap();

        let upload = load_upload(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(upload.mime_type, "image/png");
        assert!(upload.name.ends_with(".png"));
        assert_eq!(upload.bytes, b"\x89PNG....");
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let err = load_upload("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ChatError::FileNotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        let err = load_upload("   ", 5).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput { .. }));
    }
}
