//! Document Loader: turns a resume file on disk into plain text.
//!
//! Dispatches on the file suffix. Every failure is a `LoadError`; the
//! orchestrator logs it and moves on to the next file.

pub mod docx;
pub mod pdf;
pub mod sanitize;
pub mod text;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::loader::sanitize::sanitize_text;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parsing failed: {0}")]
    Pdf(String),

    #[error("DOCX parsing failed: {0}")]
    Docx(String),

    #[error("Text encoding error: {0}")]
    Encoding(String),

    #[error("Unsupported format: '{0}'")]
    UnsupportedFormat(String),

    #[error("No extractable text")]
    NoText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Pdf,
    Docx,
    Txt,
}

impl SourceFormat {
    /// Resolves the format from a path suffix, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceFormat::Pdf),
            "docx" => Some(SourceFormat::Docx),
            "txt" => Some(SourceFormat::Txt),
            _ => None,
        }
    }
}

/// A loaded resume. Immutable once built; dropped after its fields are extracted.
#[derive(Debug, Clone)]
pub struct Document {
    /// The file name; this is the row key in the sink.
    pub id: String,
    pub raw_text: String,
    pub source_format: SourceFormat,
}

/// Reads `path` and returns its sanitized text.
///
/// Blocking: runs file I/O and PDF decoding on the calling thread. Async callers
/// go through `tokio::task::spawn_blocking`.
pub fn load(path: &Path) -> Result<Document, LoadError> {
    let source_format = SourceFormat::from_path(path).ok_or_else(|| {
        LoadError::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    })?;

    let bytes = std::fs::read(path)?;
    let raw = match source_format {
        SourceFormat::Pdf => pdf::extract_pdf_text(&bytes)?,
        SourceFormat::Docx => docx::extract_docx_text(&bytes)?,
        SourceFormat::Txt => text::decode_text(bytes)?,
    };

    let raw_text = sanitize_text(&raw);
    if raw_text.trim().is_empty() {
        return Err(LoadError::NoText);
    }

    Ok(Document {
        id: document_id(path),
        raw_text,
        source_format,
    })
}

/// Derives the document id (its file name) from a path.
pub fn document_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
