//! Text extraction for source documents (PDF and plain text).
//!
//! Callers supply bytes plus a content type; this module returns plain
//! UTF-8 text or an [`ExtractError`]. Extraction never panics: a failed
//! document is reported and the ingestor skips it.

use std::path::Path;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

/// Upper bound on a single source file; CFA readings run to tens of MB.
const MAX_SOURCE_BYTES: u64 = 200 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("text is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("document contains no extractable text")]
    Empty,
    #[error("file exceeds size limit ({0} bytes)")]
    TooLarge(u64),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps a file extension to the content type used by [`extract_text`].
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "txt" => Some(MIME_TEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        _ => None,
    }
}

/// Extracts plain text from binary content.
///
/// Fails with [`ExtractError::Empty`] when parsing succeeds but yields
/// only whitespace.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    let text = match content_type {
        MIME_PDF => extract_pdf(bytes)?,
        MIME_TEXT | MIME_MARKDOWN => String::from_utf8(bytes.to_vec())
            .map_err(|e| ExtractError::Encoding(e.to_string()))?,
        _ => {
            return Err(ExtractError::UnsupportedContentType(
                content_type.to_string(),
            ))
        }
    };

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(normalize_newlines(&text))
}

/// Reads a file from disk and extracts its text based on its extension.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let content_type = content_type_for(path).ok_or_else(|| {
        ExtractError::UnsupportedContentType(
            path.extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "<none>".to_string()),
        )
    })?;

    let size = std::fs::metadata(path)?.len();
    if size > MAX_SOURCE_BYTES {
        return Err(ExtractError::TooLarge(MAX_SOURCE_BYTES));
    }

    let bytes = std::fs::read(path)?;
    extract_text(&bytes, content_type)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

// PDF output uses \r\n and form feeds between pages; the chunker splits on \n\n.
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\u{c}', "\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn whitespace_only_text_is_empty() {
        let err = extract_text(b"  \n\n \t", MIME_TEXT).unwrap_err();
        assert!(matches!(err, ExtractError::Empty));
    }

    #[test]
    fn plain_text_normalizes_line_endings() {
        let text = extract_text(b"one\r\n\r\ntwo", MIME_TEXT).unwrap();
        assert_eq!(text, "one\n\ntwo");
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for(Path::new("a/Reading 1.PDF")), Some(MIME_PDF));
        assert_eq!(content_type_for(Path::new("notes.md")), Some(MIME_MARKDOWN));
        assert_eq!(content_type_for(Path::new("deck.pptx")), None);
        assert_eq!(content_type_for(Path::new("README")), None);
    }
}
