use encoding_rs::WINDOWS_1252;
use tracing::debug;

use crate::docx::package::Container;
use crate::docx::text::part_texts;
use crate::docx::MAIN_PART;
use crate::error::{ContainerError, ExtractError};

/// Lower-case extension without the dot; empty when the name has none.
pub fn file_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Plain text of an uploaded document, picked by file extension.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String, ExtractError> {
    let ext = file_extension(filename);
    let text = match ext.as_str() {
        "txt" => extract_txt(bytes),
        "docx" => extract_docx(bytes)?,
        "pdf" => extract_pdf(bytes)?,
        _ => return Err(ExtractError::UnsupportedExtension { ext }),
    };
    debug!(filename, chars = text.chars().count(), "extracted text");
    Ok(text)
}

fn extract_txt(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // Legacy editors save as Windows-1252, a superset of Latin-1 that never fails.
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
    }
}

/// Body text only: every non-empty `w:t` of the main part, one per line.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let container = Container::read(bytes)?;
    let texts = part_texts(&container, MAIN_PART)?
        .ok_or_else(|| ContainerError::MissingPart(MAIN_PART.to_string()))?;
    Ok(texts
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf {
        detail: e.to_string(),
    })?;
    // Pages come back separated by form feeds.
    Ok(text
        .split('\x0C')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::package::tests::build_zip;
    use crate::docx::tree::W_NS;

    #[test]
    fn txt_is_utf8_with_bom_stripped() {
        let text = extract_text("\u{feff}Größe: 5 mg".as_bytes(), "notes.TXT").expect("txt");
        assert_eq!(text, "Größe: 5 mg");
    }

    #[test]
    fn txt_falls_back_to_windows_1252() {
        let text = extract_text(b"caf\xe9 \x93quoted\x94", "legacy.txt").expect("txt");
        assert_eq!(text, "café \u{201c}quoted\u{201d}");
    }

    #[test]
    fn docx_joins_body_texts_by_line() {
        let xml = format!(
            r#"<w:document xmlns:w="{W_NS}"><w:body><w:p><w:r><w:t>Purpose</w:t></w:r></w:p><w:p><w:r><w:t/></w:r><w:r><w:t>R&amp;D only</w:t></w:r></w:p></w:body></w:document>"#
        );
        let bytes = build_zip(&[("word/document.xml", xml.as_bytes(), true)]);
        assert_eq!(extract_text(&bytes, "draft.docx").expect("docx"), "Purpose\nR&D only");
    }

    #[test]
    fn docx_without_body_part_is_rejected() {
        let bytes = build_zip(&[("word/styles.xml", b"<w:styles/>", true)]);
        assert!(matches!(
            extract_text(&bytes, "x.docx"),
            Err(ExtractError::Container(ContainerError::MissingPart(_)))
        ));
    }

    #[test]
    fn garbage_pdf_is_a_pdf_error() {
        assert!(matches!(
            extract_text(b"not a pdf", "scan.pdf"),
            Err(ExtractError::Pdf { .. })
        ));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        match extract_text(b"x", "image.png") {
            Err(ExtractError::UnsupportedExtension { ext }) => assert_eq!(ext, "png"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(file_extension("README"), "");
    }
}
