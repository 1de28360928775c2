use std::collections::BTreeMap;

use tracing::debug;

use crate::docx::package::Container;
use crate::docx::placeholder::scan;
use crate::docx::tree::Document;
use crate::docx::xml::parse_xml_part;
use crate::docx::RELEVANT_PARTS;
use crate::error::ValidationError;

/// Re-opens a produced container and checks it before it is handed out.
///
/// Every entry is read to the end (zip structure and CRC), every relevant part
/// present must be well-formed, and no `w:t` may still hold a token whose key
/// is in `supplied`. Tokens for keys nobody supplied are a partial fill and
/// pass.
pub fn validate_output(
    bytes: &[u8],
    supplied: &BTreeMap<String, String>,
) -> Result<(), ValidationError> {
    let container = Container::read(bytes).map_err(ValidationError::CorruptArchive)?;

    for part in RELEVANT_PARTS {
        let Some(entry) = container.entry(part) else {
            continue;
        };
        let malformed = |source| ValidationError::MalformedXml {
            part: part.to_string(),
            source,
        };
        let events = parse_xml_part(part, &entry.data).map_err(malformed)?;
        let doc = Document::from_part(&events).map_err(malformed)?;
        let texts = doc.texts().map_err(malformed)?;

        for text in &texts {
            if let Some(ph) = scan(text).find(|ph| supplied.contains_key(ph.key)) {
                return Err(ValidationError::UnfilledPlaceholder {
                    part: part.to_string(),
                    key: ph.key.to_string(),
                });
            }
        }
        debug!(part, text_nodes = texts.len(), "validated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::package::tests::build_zip;
    use crate::docx::tree::W_NS;
    use crate::error::{ContainerError, XmlError};

    fn document(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}"><w:body><w:p><w:r><w:t>{body}</w:t></w:r></w:p></w:body></w:document>"#
        )
    }

    fn supplied(keys: &[&str]) -> BTreeMap<String, String> {
        keys.iter().map(|k| (k.to_string(), "v".to_string())).collect()
    }

    #[test]
    fn accepts_filled_output_with_unsupplied_tokens() {
        let xml = document("Acme &amp; Co {{LATER}}");
        let bytes = build_zip(&[("word/document.xml", xml.as_bytes(), true)]);
        validate_output(&bytes, &supplied(&["NAME"])).expect("valid");
    }

    #[test]
    fn rejects_corrupt_archive() {
        let bytes = build_zip(&[("word/document.xml", document("x").as_bytes(), false)]);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            validate_output(truncated, &supplied(&[])),
            Err(ValidationError::CorruptArchive(_))
        ));
    }

    #[test]
    fn rejects_entry_failing_its_checksum() {
        let xml = document("CHECKSUM-MARK");
        let mut bytes = build_zip(&[("word/document.xml", xml.as_bytes(), false)]);
        let at = bytes
            .windows(b"CHECKSUM-MARK".len())
            .position(|w| w == b"CHECKSUM-MARK")
            .expect("stored data");
        bytes[at] = b'D';
        assert!(matches!(
            validate_output(&bytes, &supplied(&[])),
            Err(ValidationError::CorruptArchive(ContainerError::Entry { .. }))
        ));
    }

    #[test]
    fn rejects_intact_supplied_key_in_body() {
        let bytes = build_zip(&[("word/document.xml", document("{{NAME}}").as_bytes(), true)]);
        assert!(matches!(
            validate_output(&bytes, &supplied(&["NAME"])),
            Err(ValidationError::UnfilledPlaceholder { part, key })
                if part == "word/document.xml" && key == "NAME"
        ));
    }

    #[test]
    fn sees_keys_spelled_with_character_references() {
        let bytes = build_zip(&[(
            "word/document.xml",
            document("&#123;&#123;NAME}}").as_bytes(),
            true,
        )]);
        assert!(matches!(
            validate_output(&bytes, &supplied(&["NAME"])),
            Err(ValidationError::UnfilledPlaceholder { .. })
        ));
    }

    #[test]
    fn undeclared_prefix_is_malformed() {
        let bytes = build_zip(&[(
            "word/document.xml",
            b"<w:document><w:body/></w:document>",
            true,
        )]);
        assert!(matches!(
            validate_output(&bytes, &supplied(&[])),
            Err(ValidationError::MalformedXml {
                source: XmlError::Structure { .. },
                ..
            })
        ));
    }

    #[test]
    fn rejects_surviving_supplied_key() {
        let header = document("{{NAME}}");
        let bytes = build_zip(&[
            ("word/document.xml", document("ok").as_bytes(), true),
            ("word/header2.xml", header.as_bytes(), true),
        ]);
        match validate_output(&bytes, &supplied(&["NAME"])) {
            Err(ValidationError::UnfilledPlaceholder { part, key }) => {
                assert_eq!(part, "word/header2.xml");
                assert_eq!(key, "NAME");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_part() {
        let bytes = build_zip(&[(
            "word/footer1.xml",
            b"<w:ftr xmlns:w=\"x\"><w:p></w:ftr>",
            true,
        )]);
        assert!(matches!(
            validate_output(&bytes, &supplied(&[])),
            Err(ValidationError::MalformedXml { part, .. }) if part == "word/footer1.xml"
        ));
    }

    #[test]
    fn ignores_parts_outside_the_relevant_set() {
        let bytes = build_zip(&[
            ("word/document.xml", document("ok").as_bytes(), true),
            ("word/comments.xml", b"<not closed", true),
        ]);
        validate_output(&bytes, &supplied(&[])).expect("valid");
    }
}
