//! PDF text extraction.
//!
//! A [`PageSource`] yields per-page text for a document; the production
//! implementation reads PDFs with `lopdf`, while tests substitute an
//! in-memory source. Pages then pass through the content filter
//! ([`filter`]) and the sliding-window chunker ([`chunking`]).
//!
//! An unreadable or encrypted document fails the whole file with
//! [`ExtractionError`]; a single page that fails to extract is logged and
//! skipped so the rest of the document still indexes.

pub mod chunking;
pub mod filter;

use crate::error::ExtractionError;
use lopdf::Document;
use std::path::Path;
use tracing::warn;

/// Text of one PDF page. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// Source of per-page text for a document.
///
/// Seam between the driver and the PDF parser, so tests can feed synthetic
/// page text without fabricating PDF files.
pub trait PageSource: Send + Sync {
    /// Extract all readable pages, in page order. Pages with no text are
    /// omitted; page-level failures are skipped, not fatal.
    fn pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError>;
}

/// Production page source backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfPageSource;

impl PageSource for PdfPageSource {
    fn pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        let document =
            Document::load(path).map_err(|e| ExtractionError::Unreadable(e.to_string()))?;

        if document.is_encrypted() {
            return Err(ExtractionError::Encrypted(path.display().to_string()));
        }

        let mut pages = Vec::new();
        for (page_number, _object_id) in document.get_pages() {
            match document.extract_text(&[page_number]) {
                Ok(text) => {
                    let cleaned = clean_page_text(&text);
                    if !cleaned.is_empty() {
                        pages.push(PageText {
                            page_number,
                            text: cleaned,
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        page = page_number,
                        path = %path.display(),
                        "skipping unreadable page: {e}"
                    );
                }
            }
        }

        Ok(pages)
    }
}

/// Normalise raw page text: collapse horizontal whitespace runs to a single
/// space, collapse blank-line runs, and re-break lines after the ideographic
/// full stop so chunk boundaries tend to fall between sentences. Line
/// structure is preserved; the content filter inspects individual lines.
pub fn clean_page_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut pending_newline = false;

    for ch in text.chars() {
        if ch == '\n' || ch == '\r' {
            pending_newline = !out.is_empty();
            pending_space = false;
            continue;
        }
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_newline {
            out.push('\n');
            pending_newline = false;
            pending_space = false;
        } else if pending_space {
            if !out.ends_with('\n') {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(ch);
        if ch == '。' {
            pending_newline = true;
        }
    }

    while out.ends_with(['\n', ' ']) {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_whitespace_runs() {
        assert_eq!(clean_page_text("a  b\t\tc"), "a b c");
    }

    #[test]
    fn clean_breaks_after_full_stop() {
        assert_eq!(
            clean_page_text("機械学習。統計の話。"),
            "機械学習。\n統計の話。"
        );
    }

    #[test]
    fn clean_trims_edges() {
        assert_eq!(clean_page_text("  テキスト  "), "テキスト");
        assert_eq!(clean_page_text("   "), "");
    }

    #[test]
    fn unreadable_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken").unwrap();

        let result = PdfPageSource.pages(&path);
        assert!(matches!(result, Err(ExtractionError::Unreadable(_))));
    }
}
