//! The service boundary: one uploaded document in, one filled template out.

use tracing::{info, info_span, warn};

use crate::config::{Settings, DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_UPLOAD_BYTES};
use crate::engine::TemplateEngine;
use crate::error::IntakeError;
use crate::extract::{extract_text, file_extension, FieldExtractor};

pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntakeLimits {
    pub max_upload_bytes: usize,
    /// Lower-case, without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for IntakeLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl IntakeLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_upload_bytes: settings.max_upload_bytes(),
            allowed_extensions: settings.allowed_extensions(),
        }
    }

    fn allowed_list(&self) -> String {
        let mut exts: Vec<&str> = self.allowed_extensions.iter().map(String::as_str).collect();
        exts.sort_unstable();
        exts.join(", ")
    }
}

#[derive(Clone, Debug)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct FormattedDocument {
    /// `{template_id}_formatted.docx`
    pub filename: String,
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

pub struct Intake<E> {
    engine: TemplateEngine,
    extractor: E,
    limits: IntakeLimits,
}

impl<E: FieldExtractor> Intake<E> {
    pub fn new(engine: TemplateEngine, extractor: E, limits: IntakeLimits) -> Self {
        Self {
            engine,
            extractor,
            limits,
        }
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Checks run cheapest first: template id, extension, size and emptiness
    /// are all rejected before any text is extracted.
    pub fn format_document(
        &self,
        template_id: &str,
        upload: &Upload,
    ) -> Result<FormattedDocument, IntakeError> {
        let span = info_span!("format", template = template_id);
        let _enter = span.enter();

        let template = self.engine.catalog().lookup(template_id)?;

        let filename = if upload.filename.is_empty() {
            "upload"
        } else {
            upload.filename.as_str()
        };
        let ext = file_extension(filename);
        if !self.limits.allowed_extensions.iter().any(|e| *e == ext) {
            return Err(IntakeError::UnsupportedExtension {
                ext,
                allowed: self.limits.allowed_list(),
            });
        }
        if upload.bytes.len() > self.limits.max_upload_bytes {
            return Err(IntakeError::TooLarge {
                size: upload.bytes.len(),
                limit: self.limits.max_upload_bytes,
            });
        }
        if upload.bytes.is_empty() {
            return Err(IntakeError::EmptyUpload);
        }

        let text = extract_text(&upload.bytes, filename).map_err(IntakeError::TextExtraction)?;
        if text.trim().is_empty() {
            return Err(IntakeError::NoText);
        }

        let values = self
            .extractor
            .extract_fields(template, &text)
            .map_err(IntakeError::FieldExtraction)?;
        let empty = values.values().filter(|v| v.is_empty()).count();
        if empty > 0 {
            warn!(empty, total = values.len(), "some fields have no extracted content");
        }

        let bytes = self.engine.fill(template_id, &values)?;
        info!(filename, output_bytes = bytes.len(), "document formatted");
        Ok(FormattedDocument {
            filename: format!("{template_id}_formatted.docx"),
            media_type: DOCX_MEDIA_TYPE,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use super::*;
    use crate::catalog::tests::info;
    use crate::catalog::TemplateCatalog;
    use crate::docx::package::tests::build_zip;
    use crate::docx::package::Container;
    use crate::docx::tree::W_NS;
    use crate::error::{ErrorKind, ExtractError};
    use crate::extract::JsonValuesExtractor;

    struct FailingExtractor;

    impl FieldExtractor for FailingExtractor {
        fn extract_fields(
            &self,
            _template: &crate::catalog::TemplateInfo,
            _text: &str,
        ) -> Result<BTreeMap<String, String>, ExtractError> {
            Err(ExtractError::MalformedModelOutput {
                detail: "expected value".to_string(),
                excerpt: "Sorry".to_string(),
            })
        }
    }

    fn write_template(dir: &Path, body: &str) -> std::path::PathBuf {
        let xml = format!(
            r#"<w:document xmlns:w="{W_NS}"><w:body><w:p><w:r><w:t>{body}</w:t></w:r></w:p></w:body></w:document>"#
        );
        let path = dir.join("SOP_Template.docx");
        std::fs::write(&path, build_zip(&[("word/document.xml", xml.as_bytes(), true)]))
            .expect("write template");
        path
    }

    fn intake<E: FieldExtractor>(dir: &Path, body: &str, extractor: E) -> Intake<E> {
        let mut sop = info("sop", &["SOP_TITLE", "PURPOSE"]);
        sop.file = write_template(dir, body);
        let engine = TemplateEngine::new(TemplateCatalog::new(vec![sop]).expect("catalog"));
        Intake::new(engine, extractor, IntakeLimits::default())
    }

    fn upload(filename: &str, bytes: &[u8]) -> Upload {
        Upload {
            filename: filename.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn formats_a_text_upload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let intake = intake(
            dir.path(),
            "{{SOP_TITLE}}: {{PURPOSE}}",
            JsonValuesExtractor::new(r#"{"SOP_TITLE": "Cold Chain", "PURPOSE": "Keep <2-8C>"}"#),
        );
        let out = intake
            .format_document("sop", &upload("notes.txt", b"messy notes"))
            .expect("format");
        assert_eq!(out.filename, "sop_formatted.docx");
        assert_eq!(out.media_type, DOCX_MEDIA_TYPE);

        let container = Container::read(&out.bytes).expect("read");
        let xml = String::from_utf8(container.entry("word/document.xml").expect("part").data.clone())
            .expect("utf8");
        assert!(xml.contains("Cold Chain: Keep &lt;2-8C&gt;"), "{xml}");
    }

    #[test]
    fn rejects_bad_requests_as_input_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let intake = intake(dir.path(), "{{SOP_TITLE}}", JsonValuesExtractor::new("{}"));
        let cases = [
            ("memo", upload("a.txt", b"x")),
            ("sop", upload("a.exe", b"x")),
            ("sop", upload("README", b"x")),
            ("sop", upload("a.txt", &vec![b'a'; DEFAULT_MAX_UPLOAD_BYTES + 1])),
            ("sop", upload("a.txt", b"")),
            ("sop", upload("a.txt", b" \n\t ")),
            ("sop", upload("a.docx", b"not a zip")),
        ];
        for (id, up) in cases {
            let err = intake.format_document(id, &up).expect_err(&up.filename);
            assert_eq!(err.kind(), ErrorKind::Input, "{err}");
        }
    }

    #[test]
    fn extension_message_lists_allowed_types() {
        let dir = tempfile::tempdir().expect("tempdir");
        let intake = intake(dir.path(), "x", JsonValuesExtractor::new("{}"));
        let err = intake
            .format_document("sop", &upload("scan.PNG", b"x"))
            .expect_err("png");
        assert_eq!(err.to_string(), "unsupported file type: .png. Allowed: docx, pdf, txt");
    }

    #[test]
    fn extractor_failure_is_upstream() {
        let dir = tempfile::tempdir().expect("tempdir");
        let intake = intake(dir.path(), "{{SOP_TITLE}}", FailingExtractor);
        let err = intake
            .format_document("sop", &upload("a.txt", b"text"))
            .expect_err("upstream");
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn broken_template_is_an_engine_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let intake = intake(dir.path(), "x", JsonValuesExtractor::new("{}"));
        std::fs::write(dir.path().join("SOP_Template.docx"), b"corrupt").expect("overwrite");
        let err = intake
            .format_document("sop", &upload("a.txt", b"text"))
            .expect_err("engine");
        assert_eq!(err.kind(), ErrorKind::Engine);
    }
}
