//! Error types for the fill engine and the intake pipeline around it.
//!
//! Each layer has its own closed enum so callers can match on the failure
//! kind: [`ContainerError`] for the zip codec, [`XmlError`] for part parsing,
//! [`ValidationError`] for the post-fill check and [`FillError`] for the
//! orchestrator that wraps all three. [`IntakeError`] sits on top and sorts
//! every failure into [`ErrorKind::Input`], [`ErrorKind::Upstream`] or
//! [`ErrorKind::Engine`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("not a valid zip archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("read zip entry {name}: {source}")]
    Entry {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write zip entry {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("container has no {0} part")]
    MissingPart(String),
}

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml syntax error in {part}: {source}")]
    Syntax {
        part: String,
        #[source]
        source: quick_xml::Error,
    },

    #[error("bad entity reference in {part}: {source}")]
    Escape {
        part: String,
        #[source]
        source: quick_xml::escape::EscapeError,
    },

    #[error("{part} is not utf-8")]
    Encoding { part: String },

    #[error("ill-formed xml in {part}: {detail}")]
    Structure { part: String, detail: String },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("output is not a valid archive: {0}")]
    CorruptArchive(#[source] ContainerError),

    #[error("malformed xml in {part}: {source}")]
    MalformedXml {
        part: String,
        #[source]
        source: XmlError,
    },

    #[error("unfilled placeholder {{{{{key}}}}} remains in {part}")]
    UnfilledPlaceholder { part: String, key: String },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate template id: {0}")]
    DuplicateId(String),

    #[error("template {template}: invalid placeholder key {key:?}")]
    InvalidKey { template: String, key: String },

    #[error("template {template}: placeholder key {key} listed twice")]
    DuplicateKey { template: String, key: String },
}

#[derive(Debug, Error)]
pub enum FillError {
    #[error("unknown template '{id}'. Valid templates: {valid}")]
    TemplateNotFound { id: String, valid: String },

    #[error("read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {id} checksum mismatch (expected {expected}, got {actual})")]
    TemplateChecksum {
        id: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("post-fill validation failed: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: .{ext}. Supported: .docx, .pdf, .txt")]
    UnsupportedExtension { ext: String },

    #[error("invalid .docx: {0}")]
    Container(#[from] ContainerError),

    #[error("invalid .docx: {0}")]
    Xml(#[from] XmlError),

    #[error("invalid .pdf: {detail}")]
    Pdf { detail: String },

    #[error("model returned invalid JSON: {detail}\nResponse: {excerpt}")]
    MalformedModelOutput { detail: String, excerpt: String },
}

/// Coarse classification used at the service boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caused by the request; reported back with the reason, never retried.
    Input,
    /// The field-extraction model misbehaved; the caller may re-submit.
    Upstream,
    /// Corrupt template, malformed xml or a supplied key surviving the fill.
    Engine,
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("unsupported file type: .{ext}. Allowed: {allowed}")]
    UnsupportedExtension { ext: String, allowed: String },

    #[error("file too large ({size} bytes). Maximum size: {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("uploaded file is empty")]
    EmptyUpload,

    #[error("failed to extract text: {0}")]
    TextExtraction(#[source] ExtractError),

    #[error("no text content found in uploaded file")]
    NoText,

    #[error("field extraction failed: {0}")]
    FieldExtraction(#[source] ExtractError),

    #[error("template fill failed: {0}")]
    Fill(#[from] FillError),
}

impl IntakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntakeError::UnsupportedExtension { .. }
            | IntakeError::TooLarge { .. }
            | IntakeError::EmptyUpload
            | IntakeError::TextExtraction(_)
            | IntakeError::NoText
            | IntakeError::Fill(FillError::TemplateNotFound { .. }) => ErrorKind::Input,
            IntakeError::FieldExtraction(_) => ErrorKind::Upstream,
            IntakeError::Fill(_) => ErrorKind::Engine,
        }
    }
}
