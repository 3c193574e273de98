use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use super::LoadError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extracts the body text of a DOCX file.
///
/// Reads the main document part out of the zip container and concatenates its
/// `w:t` runs. Paragraph ends become newlines, `w:tab` a tab, `w:br`/`w:cr` a newline.
pub fn extract_docx_text(docx_bytes: &[u8]) -> Result<String, LoadError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(docx_bytes))
        .map_err(|e| LoadError::Docx(format!("not a zip container: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| LoadError::Docx(format!("missing {DOCUMENT_PART}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| LoadError::Docx(format!("unreadable {DOCUMENT_PART}: {e}")))?;

    document_xml_to_text(&xml)
}

fn document_xml_to_text(xml: &str) -> Result<String, LoadError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| LoadError::Docx(format!("bad text run: {e}")))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(LoadError::Docx(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fixtures::{make_docx, zip_with_entry};

    #[test]
    fn test_paragraphs_become_lines() {
        let text = extract_docx_text(&make_docx(&["Jane Doe", "Senior Engineer"])).unwrap();
        assert_eq!(text, "Jane Doe\nSenior Engineer\n");
    }

    #[test]
    fn test_runs_tabs_and_entities() {
        let xml = r#"<w:document xmlns:w="urn:w"><w:body>
            <w:p><w:r><w:t>R&amp;D</w:t></w:r><w:r><w:tab/><w:t>Lead</w:t></w:r></w:p>
            <w:p><w:r><w:t>Line one</w:t><w:br/><w:t>Line two</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = document_xml_to_text(xml).unwrap();
        assert_eq!(text, "R&D\tLead\nLine one\nLine two\n");
    }

    #[test]
    fn test_text_outside_runs_is_ignored() {
        let xml = r#"<w:document xmlns:w="urn:w"><w:body><w:p><w:instrText>PAGE</w:instrText><w:r><w:t>Visible</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(document_xml_to_text(xml).unwrap(), "Visible\n");
    }

    #[test]
    fn test_zip_without_document_part_fails() {
        let bytes = zip_with_entry("word/styles.xml", "<w:styles/>");
        match extract_docx_text(&bytes) {
            Err(LoadError::Docx(msg)) => assert!(msg.contains("word/document.xml")),
            other => panic!("expected Docx error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_zip_bytes_fail() {
        assert!(matches!(
            extract_docx_text(b"plain text pretending to be docx"),
            Err(LoadError::Docx(_))
        ));
    }

    #[test]
    fn test_malformed_xml_fails() {
        let bytes = zip_with_entry("word/document.xml", "<w:document><w:body><w:p></w:body>");
        assert!(matches!(extract_docx_text(&bytes), Err(LoadError::Docx(_))));
    }
}
