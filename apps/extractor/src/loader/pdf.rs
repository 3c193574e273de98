use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use super::LoadError;

/// Extracts the text layer of a PDF, page by page, using pdf-extract.
///
/// Pages that yield no text (scanned images, blank separators) are skipped.
/// pdf-extract panics on some malformed inputs; that is reported as a
/// `LoadError::Pdf` like any other parse failure.
pub fn extract_pdf_text(pdf_bytes: &[u8]) -> Result<String, LoadError> {
    let pages = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
    }))
    .map_err(|payload| LoadError::Pdf(panic_message(payload.as_ref())))?
    .map_err(|e| LoadError::Pdf(e.to_string()))?;

    let total = pages.len();
    let texts: Vec<String> = pages
        .into_iter()
        .filter(|page| !page.trim().is_empty())
        .collect();

    if texts.len() < total {
        debug!(
            "Skipped {} of {} PDF pages without a text layer",
            total - texts.len(),
            total
        );
    }

    Ok(texts.join("\n"))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("extractor panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("extractor panicked: {s}")
    } else {
        "extractor panicked".to_string()
    }
}
