use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::PromptsSection;

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_SYSTEM: &str = "system.txt";
pub const DEFAULT_EXTRACT: &str = "extract.txt";

pub const DEFAULT_SYSTEM_TEXT: &str = include_str!("../prompts/system.txt");
pub const DEFAULT_EXTRACT_TEXT: &str = include_str!("../prompts/extract.txt");

/// Fallback intro for templates without a section outline.
pub const GENERIC_INTRO: &str =
    "Extract content from this document to fill a template with specific placeholder fields.";

#[derive(Clone, Debug)]
pub struct PromptSet {
    pub system: String,
    /// User prompt with `{{intro}}`, `{{keys}}` and `{{document_text}}` slots.
    pub extract: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_TEXT.to_string(),
            extract: DEFAULT_EXTRACT_TEXT.to_string(),
        }
    }
}

impl PromptSet {
    /// Paths set in the config must exist; the default locations fall back to
    /// the built-in text when no prompt file was written there.
    pub fn load(config_dir: &Path, p: &PromptsSection) -> anyhow::Result<Self> {
        Ok(Self {
            system: read_prompt(config_dir, p.system.as_deref(), DEFAULT_SYSTEM, DEFAULT_SYSTEM_TEXT)?,
            extract: read_prompt(
                config_dir,
                p.extract.as_deref(),
                DEFAULT_EXTRACT,
                DEFAULT_EXTRACT_TEXT,
            )?,
        })
    }
}

fn read_prompt(
    config_dir: &Path,
    configured: Option<&str>,
    default_filename: &str,
    builtin: &str,
) -> anyhow::Result<String> {
    let Some(path) = configured else {
        let p = config_dir.join(DEFAULT_PROMPTS_DIR).join(default_filename);
        if !p.exists() {
            return Ok(builtin.to_string());
        }
        return std::fs::read_to_string(&p)
            .with_context(|| format!("read prompt: {}", p.display()));
    };

    let mut p = PathBuf::from(path);
    if p.is_relative() {
        p = config_dir.join(&p);
    }
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found: {} (run: docfill init-config)",
            p.display()
        ));
    }
    std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))
}

/// Substitutes `{{name}}` slots in order. Later values are not rescanned for
/// slots filled earlier, so put untrusted text last.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_SYSTEM, DEFAULT_SYSTEM_TEXT),
        (DEFAULT_EXTRACT, DEFAULT_EXTRACT_TEXT),
    ]
}
