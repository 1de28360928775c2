use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::docx::placeholder::is_valid_key;
use crate::error::{CatalogError, FillError};

/// One fillable template as declared in the config.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TemplateInfo {
    pub id: String,
    /// Resolved against `catalog.templates_dir` when relative.
    pub file: PathBuf,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub placeholders: Vec<String>,
    /// Hex sha256 of the template file; checked before every fill when set.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Section outline shown to the field extractor ahead of the key list.
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Listing entry for clients choosing a template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    #[serde(rename = "type")]
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub placeholder_count: usize,
}

impl From<&TemplateInfo> for TemplateSummary {
    fn from(t: &TemplateInfo) -> Self {
        Self {
            id: t.id.clone(),
            display_name: t.display_name.clone(),
            description: t.description.clone(),
            placeholder_count: t.placeholders.len(),
        }
    }
}

/// Immutable set of templates, looked up by id.
#[derive(Clone, Debug, Default)]
pub struct TemplateCatalog {
    templates: Vec<TemplateInfo>,
}

impl TemplateCatalog {
    /// Ids must be unique and every key must be a well-formed placeholder key
    /// listed once per template.
    pub fn new(templates: Vec<TemplateInfo>) -> Result<Self, CatalogError> {
        let mut ids = BTreeSet::new();
        for t in &templates {
            if !ids.insert(t.id.as_str()) {
                return Err(CatalogError::DuplicateId(t.id.clone()));
            }
            let mut keys = BTreeSet::new();
            for key in &t.placeholders {
                if !is_valid_key(key) {
                    return Err(CatalogError::InvalidKey {
                        template: t.id.clone(),
                        key: key.clone(),
                    });
                }
                if !keys.insert(key.as_str()) {
                    return Err(CatalogError::DuplicateKey {
                        template: t.id.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(Self { templates })
    }

    pub fn lookup(&self, id: &str) -> Result<&TemplateInfo, FillError> {
        self.templates
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| FillError::TemplateNotFound {
                id: id.to_string(),
                valid: self.ids().join(", "),
            })
    }

    /// Sorted template ids.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.iter().map(|t| t.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateInfo> {
        self.templates.iter()
    }

    /// Summaries in declaration order.
    pub fn summaries(&self) -> Vec<TemplateSummary> {
        self.templates.iter().map(TemplateSummary::from).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
