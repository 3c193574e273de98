use super::LoadError;

/// Decodes a plain-text resume. Files must be UTF-8; a leading BOM is dropped.
pub fn decode_text(bytes: Vec<u8>) -> Result<String, LoadError> {
    let text = String::from_utf8(bytes).map_err(|e| LoadError::Encoding(e.to_string()))?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}
