//! Fills a template container end to end: every relevant part is parsed,
//! its runs merged, its placeholders substituted and serialized again; the
//! container is repacked around the changed parts and the result validated
//! before any byte is returned.

use std::collections::BTreeMap;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span};

use crate::catalog::{TemplateCatalog, TemplateInfo};
use crate::docx::fill::fill_placeholders;
use crate::docx::merge::merge_runs;
use crate::docx::package::{repack, unpack, Container};
use crate::docx::placeholder::escape_values;
use crate::docx::tree::Document;
use crate::docx::validate::validate_output;
use crate::docx::xml::{parse_xml_part, write_xml_part};
use crate::docx::{MAIN_PART, RELEVANT_PARTS};
use crate::error::{ContainerError, FillError};

/// What happened to one part during a fill.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartReport {
    pub part: String,
    pub merged_runs: usize,
    pub replaced: usize,
    pub runs_restyled: usize,
}

#[derive(Clone, Debug)]
pub struct FilledDocument {
    pub bytes: Vec<u8>,
    pub parts: Vec<PartReport>,
}

impl FilledDocument {
    pub fn replaced(&self) -> usize {
        self.parts.iter().map(|p| p.replaced).sum()
    }
}

/// Stateless apart from its catalog; safe to share across threads.
#[derive(Clone, Debug)]
pub struct TemplateEngine {
    catalog: TemplateCatalog,
}

impl TemplateEngine {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Fills the catalog template `template_id` with raw (unescaped) values.
    pub fn fill(
        &self,
        template_id: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, FillError> {
        let template = self.catalog.lookup(template_id)?;
        let span = info_span!("fill", template = %template.id);
        let _enter = span.enter();

        let bytes = read_template(template)?;
        Ok(fill_bytes(&bytes, values)?.bytes)
    }
}

fn read_template(template: &TemplateInfo) -> Result<Vec<u8>, FillError> {
    let bytes = std::fs::read(&template.file).map_err(|source| FillError::TemplateRead {
        path: template.file.clone(),
        source,
    })?;
    if let Some(expected) = template.sha256.as_deref() {
        let actual = hex::encode(Sha256::digest(&bytes));
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(FillError::TemplateChecksum {
                id: template.id.clone(),
                expected: expected.to_string(),
                actual,
            });
        }
    }
    Ok(bytes)
}

/// Fills template container bytes directly.
///
/// Values are escaped once here. Keys with no value leave their tokens in
/// place; the output is only returned after it re-opens cleanly and no
/// supplied key survives in any relevant part.
pub fn fill_bytes(
    template: &[u8],
    values: &BTreeMap<String, String>,
) -> Result<FilledDocument, FillError> {
    let started = Instant::now();
    let escaped = escape_values(values);
    let entries = unpack(template)?;
    if !entries.contains_key(MAIN_PART) {
        return Err(ContainerError::MissingPart(MAIN_PART.to_string()).into());
    }

    let mut modified: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut parts = Vec::new();
    for part in RELEVANT_PARTS {
        let Some(data) = entries.get(part) else {
            continue;
        };
        let events = parse_xml_part(part, data)?;
        let mut doc = Document::from_part(&events)?;
        let merged_runs = merge_runs(&mut doc);
        let stats = fill_placeholders(&mut doc, &escaped);
        debug!(
            part,
            merged_runs,
            replaced = stats.replaced,
            runs_restyled = stats.runs_restyled,
            "filled part"
        );
        modified.insert(part.to_string(), doc.to_bytes());
        parts.push(PartReport {
            part: part.to_string(),
            merged_runs,
            replaced: stats.replaced,
            runs_restyled: stats.runs_restyled,
        });
    }

    let bytes = repack(template, &modified)?;
    validate_output(&bytes, &escaped)?;

    let filled = FilledDocument { bytes, parts };
    info!(
        parts = filled.parts.len(),
        replaced = filled.replaced(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "template filled"
    );
    Ok(filled)
}

/// Parses and rewrites every XML entry through the event codec without
/// changing anything. Useful to check that a template survives the codec:
/// the output should be byte-identical part by part.
pub fn roundtrip_bytes(template: &[u8]) -> Result<Vec<u8>, FillError> {
    let container = Container::read(template)?;
    let mut rewritten: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for entry in container.xml_entries() {
        if entry.data.is_empty() {
            continue;
        }
        let part = parse_xml_part(&entry.name, &entry.data)?;
        rewritten.insert(entry.name.clone(), write_xml_part(&part));
    }
    debug!(parts = rewritten.len(), "round-tripped xml parts");
    Ok(repack(template, &rewritten)?)
}
