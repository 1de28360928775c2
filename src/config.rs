use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use crate::catalog::{TemplateCatalog, TemplateInfo};
use crate::prompts::{default_prompt_files, PromptSet, DEFAULT_PROMPTS_DIR};

pub const CONFIG_FILENAME: &str = "docfill.toml";
pub const CONFIG_ENV: &str = "DOCFILL_CONFIG";

pub const DEFAULT_CONFIG_TEXT: &str = include_str!("../config/docfill.toml");

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 3] = ["docx", "pdf", "txt"];
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub intake: IntakeSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub templates: Vec<TemplateInfo>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct IntakeSection {
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
    /// Lower-case, without the leading dot.
    #[serde(default)]
    pub allowed_extensions: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CatalogSection {
    /// Directory holding the template files. Relative to the config file.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub extract: Option<String>,
}

/// A parsed config together with the file it came from.
#[derive(Clone, Debug)]
pub struct Settings {
    pub config_path: PathBuf,
    pub app: AppConfig,
}

impl Settings {
    /// Uses `explicit`, then `DOCFILL_CONFIG`, then a `docfill.toml` found
    /// upwards from the working directory, `workdir` or the executable. When
    /// none exists the built-in defaults apply, anchored at `workdir`.
    pub fn discover(explicit: Option<PathBuf>, workdir: &Path) -> anyhow::Result<Self> {
        let cfg_file = explicit
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(workdir, CONFIG_FILENAME));

        if let Some(p) = cfg_file {
            let app = load_config(&p)?;
            debug!(config = %p.display(), templates = app.templates.len(), "loaded config");
            return Ok(Self {
                config_path: p,
                app,
            });
        }

        debug!("no config file found, using built-in defaults");
        let app: AppConfig =
            toml::from_str(DEFAULT_CONFIG_TEXT).context("parse built-in config toml")?;
        Ok(Self {
            config_path: workdir.join(CONFIG_FILENAME),
            app,
        })
    }

    pub fn config_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn templates_dir(&self) -> PathBuf {
        let dir = self
            .app
            .catalog
            .templates_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATES_DIR));
        if dir.is_relative() {
            self.config_dir().join(dir)
        } else {
            dir
        }
    }

    /// Catalog with every template file resolved to a full path.
    pub fn catalog(&self) -> anyhow::Result<TemplateCatalog> {
        let templates_dir = self.templates_dir();
        let templates = self
            .app
            .templates
            .iter()
            .cloned()
            .map(|mut t| {
                if t.file.is_relative() {
                    t.file = templates_dir.join(&t.file);
                }
                t
            })
            .collect();
        TemplateCatalog::new(templates)
            .with_context(|| format!("invalid template catalog in {}", self.config_path.display()))
    }

    pub fn prompts(&self) -> anyhow::Result<PromptSet> {
        PromptSet::load(self.config_dir(), &self.app.prompts)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.app
            .intake
            .max_upload_bytes
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
    }

    pub fn allowed_extensions(&self) -> Vec<String> {
        match self.app.intake.allowed_extensions.as_ref() {
            Some(exts) => exts
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            None => DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text)
        .with_context(|| format!("parse config toml: {}", path.display()))?;
    Ok(cfg)
}

/// Writes `docfill.toml`, the prompt files and an empty templates directory
/// into `dir`. Existing files are kept unless `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;
    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    let templates_dir = dir.join(DEFAULT_TEMPLATES_DIR);
    std::fs::create_dir_all(&templates_dir)
        .with_context(|| format!("create templates dir: {}", templates_dir.display()))?;

    if !cfg_path.exists() || force {
        std::fs::write(&cfg_path, DEFAULT_CONFIG_TEXT)
            .with_context(|| format!("write config: {}", cfg_path.display()))?;
    }
    Ok(cfg_path)
}
