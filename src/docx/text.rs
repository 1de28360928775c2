use std::collections::BTreeSet;

use crate::docx::merge::merge_runs;
use crate::docx::package::Container;
use crate::docx::placeholder::scan;
use crate::docx::tree::Document;
use crate::docx::RELEVANT_PARTS;
use crate::error::XmlError;

/// Unescaped `w:t` texts of one part, or `None` when the part is absent.
pub fn part_texts(container: &Container, part: &str) -> Result<Option<Vec<String>>, XmlError> {
    let Some(entry) = container.entry(part) else {
        return Ok(None);
    };
    Document::parse(part, &entry.data)?.texts().map(Some)
}

/// Placeholder tokens a relevant part exposes to the filler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartInventory {
    pub part: String,
    /// Distinct keys, sorted.
    pub keys: BTreeSet<String>,
    /// Token occurrences, counting repeats.
    pub occurrences: usize,
    /// Runs folded by the merge pass before scanning.
    pub merged_runs: usize,
}

/// Scans every relevant part the way a fill sees it: runs merged first, so
/// tokens split across same-format runs are reported whole. The container is
/// not modified.
pub fn placeholder_inventory(container: &Container) -> Result<Vec<PartInventory>, XmlError> {
    let mut out = Vec::new();
    for part in RELEVANT_PARTS {
        let Some(entry) = container.entry(part) else {
            continue;
        };
        let mut doc = Document::parse(part, &entry.data)?;
        let merged_runs = merge_runs(&mut doc);

        let mut keys = BTreeSet::new();
        let mut occurrences = 0usize;
        for text in doc.texts()? {
            for ph in scan(&text) {
                keys.insert(ph.key.to_string());
                occurrences += 1;
            }
        }
        out.push(PartInventory {
            part: part.to_string(),
            keys,
            occurrences,
            merged_runs,
        });
    }
    Ok(out)
}
