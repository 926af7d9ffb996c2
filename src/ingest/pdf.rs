//! PDF text-layer extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! runtime's worker threads never stall on a large document.
//!
//! No rendering happens here: only the text layer each page already carries
//! is read, so scanned PDFs without a text layer yield empty text.

use crate::error::ExtractError;
use futures::future::BoxFuture;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Text tokens of one page, in reading order.
pub type PageTokens = Vec<String>;

/// Reads the text tokens of every page of a PDF.
pub trait PdfTextExtractor: Send + Sync {
    /// One entry per page, page 1 first.
    fn page_tokens<'a>(
        &'a self,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<Vec<PageTokens>, ExtractError>>;
}

/// Join tokens with single spaces within a page, and pages with single spaces.
pub fn join_pages(pages: &[PageTokens]) -> String {
    pages
        .iter()
        .map(|tokens| tokens.join(" "))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the full text of a PDF.
pub async fn extract_pdf_text(
    extractor: &dyn PdfTextExtractor,
    bytes: &[u8],
) -> Result<String, ExtractError> {
    let pages = extractor.page_tokens(bytes).await?;
    debug!("PDF text layer: {} pages", pages.len());
    Ok(join_pages(&pages))
}

/// [`PdfTextExtractor`] backed by the pdfium library.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumTextExtractor;

impl PdfTextExtractor for PdfiumTextExtractor {
    fn page_tokens<'a>(
        &'a self,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<Vec<PageTokens>, ExtractError>> {
        let owned = bytes.to_vec();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || page_tokens_blocking(owned))
                .await
                .map_err(|e| ExtractError::Task(format!("PDF text task panicked: {}", e)))?
        })
    }
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the working directory, then
/// the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(PathBuf::from(path)),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of text-layer extraction.
fn page_tokens_blocking(bytes: Vec<u8>) -> Result<Vec<PageTokens>, ExtractError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_vec(bytes, None)
        .map_err(|e| ExtractError::CorruptPdf(format!("{:?}", e)))?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut result = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page.text().map_err(|e| ExtractError::PageText {
            page: idx + 1,
            detail: format!("{:?}", e),
        })?;

        let tokens: PageTokens = text.segments().iter().map(|s| s.text()).collect();
        debug!("Page {}: {} text tokens", idx + 1, tokens.len());
        result.push(tokens);
    }

    Ok(result)
}
