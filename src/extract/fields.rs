use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::TemplateInfo;
use crate::error::ExtractError;
use crate::prompts::{render_template, PromptSet, GENERIC_INTRO};

static FENCE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```.*(\r?\n|$)").expect("fence line"));

const EXCERPT_CHARS: usize = 500;

/// Maps document text onto a template's placeholder keys.
///
/// Implementations return a value for every key the template lists, using
/// `""` for fields with no matching content.
pub trait FieldExtractor {
    fn extract_fields(
        &self,
        template: &TemplateInfo,
        text: &str,
    ) -> Result<BTreeMap<String, String>, ExtractError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionPrompt {
    pub system: String,
    pub user: String,
}

pub fn build_extraction_prompt(
    prompts: &PromptSet,
    template: &TemplateInfo,
    document_text: &str,
) -> ExtractionPrompt {
    let intro = template
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(GENERIC_INTRO);
    let keys = template
        .placeholders
        .iter()
        .map(|k| format!("  \"{k}\": \"\""))
        .collect::<Vec<_>>()
        .join("\n");
    let user = render_template(
        &prompts.extract,
        &[
            ("intro", intro),
            ("keys", &keys),
            ("document_text", document_text),
        ],
    );
    ExtractionPrompt {
        system: prompts.system.clone(),
        user,
    }
}

/// Turns a model reply into one value per template key.
///
/// Markdown fences are dropped and the first JSON object in the reply is
/// read; trailing chatter after it is ignored. Strings are kept, other
/// scalars are stringified, `null` and missing keys become `""`, and keys the
/// template does not list are dropped.
pub fn parse_model_reply(
    template: &TemplateInfo,
    reply: &str,
) -> Result<BTreeMap<String, String>, ExtractError> {
    let cleaned = FENCE_LINE_RE.replace_all(reply.trim(), "");
    let malformed = |detail: String| ExtractError::MalformedModelOutput {
        detail,
        excerpt: cleaned.chars().take(EXCERPT_CHARS).collect(),
    };

    let start = cleaned
        .find('{')
        .ok_or_else(|| malformed("no JSON object in reply".to_string()))?;
    let mut de = serde_json::Deserializer::from_str(&cleaned[start..]);
    let parsed = Value::deserialize(&mut de).map_err(|e| malformed(e.to_string()))?;
    let Value::Object(mut obj) = parsed else {
        return Err(malformed("reply is not a JSON object".to_string()));
    };

    let mut out = BTreeMap::new();
    for key in &template.placeholders {
        let value = obj.remove(key).map(stringify_value).unwrap_or_default();
        out.insert(key.clone(), value);
    }
    if !obj.is_empty() {
        debug!(
            template = %template.id,
            ignored = obj.len(),
            "reply carried keys the template does not use"
        );
    }
    Ok(out)
}

/// Strings as they are, `null` as `""`, anything else as compact JSON.
pub fn stringify_value(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Field extractor backed by a reply that was produced ahead of time, for
/// example a saved model response or hand-written values.
#[derive(Clone, Debug)]
pub struct JsonValuesExtractor {
    reply: String,
}

impl JsonValuesExtractor {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::read_to_string(path)?))
    }
}

impl FieldExtractor for JsonValuesExtractor {
    fn extract_fields(
        &self,
        template: &TemplateInfo,
        _text: &str,
    ) -> Result<BTreeMap<String, String>, ExtractError> {
        let values = parse_model_reply(template, &self.reply)?;
        let empty = values.values().filter(|v| v.is_empty()).count();
        if empty == values.len() && !values.is_empty() {
            warn!(template = %template.id, "reply filled none of the template keys");
        }
        Ok(values)
    }
}
