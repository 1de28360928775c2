use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docfill::config::{init_default_config, Settings};
use docfill::docx::package::Container;
use docfill::docx::text::placeholder_inventory;
use docfill::engine::{fill_bytes, roundtrip_bytes, TemplateEngine};
use docfill::extract::{
    build_extraction_prompt, extract_text, stringify_value, JsonValuesExtractor,
};
use docfill::intake::{Intake, IntakeLimits, Upload};

#[derive(Parser, Debug)]
#[command(name = "docfill")]
#[command(about = "Fill {{KEY}} placeholders in .docx templates without disturbing their layout", long_about = None)]
struct Args {
    /// Config file path (default: $DOCFILL_CONFIG, or search for docfill.toml upwards)
    #[arg(long, global = true, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Log debug detail (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill a template from a JSON object of values and/or --set pairs
    Fill {
        /// Template id from the catalog
        #[arg(value_name = "TEMPLATE", required_unless_present = "template_file")]
        template: Option<String>,

        /// Fill this .docx directly instead of a catalog template
        #[arg(long, value_name = "DOCX", conflicts_with = "template")]
        template_file: Option<PathBuf>,

        /// JSON object mapping placeholder keys to values
        #[arg(long, value_name = "JSON")]
        values: Option<PathBuf>,

        /// KEY=VALUE, repeatable; wins over --values
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Output .docx (default: <template>_filled.docx)
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
    },

    /// List catalog templates
    Templates {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the placeholders a template exposes, compared with its catalog keys
    Inspect {
        #[arg(value_name = "TEMPLATE", required_unless_present = "template_file")]
        template: Option<String>,

        #[arg(long, value_name = "DOCX", conflicts_with = "template")]
        template_file: Option<PathBuf>,
    },

    /// Print the plain text extracted from a .docx, .pdf or .txt
    ExtractText {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Print the field-extraction prompt for a document and template
    Prompt {
        #[arg(value_name = "TEMPLATE")]
        template: String,

        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Run the full intake: validate upload, extract text, read fields from a prepared reply, fill
    Format {
        #[arg(value_name = "TEMPLATE")]
        template: String,

        /// Uploaded document (.docx, .pdf or .txt)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Model reply (JSON, optionally fenced) to read the field values from
        #[arg(long, value_name = "JSON")]
        reply: PathBuf,

        /// Output .docx (default: <template>_formatted.docx)
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
    },

    /// Parse and re-serialize every XML part without filling (codec check)
    Roundtrip {
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        #[arg(short, long, value_name = "DOCX")]
        output: PathBuf,
    },

    /// Generate default config + prompt files, then exit
    InitConfig {
        /// Directory to write config/prompt files (default: current directory)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Overwrite existing config/prompt files
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "docfill=debug" } else { "docfill=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::InitConfig { dir, force } => {
            let dir = dir.unwrap_or_else(current_dir);
            let cfg_path = init_default_config(&dir, force).context("init default config")?;
            eprintln!("Wrote config: {}", cfg_path.display());
            Ok(())
        }
        Command::ExtractText { input } => {
            let bytes = read_input(&input)?;
            let text = extract_text(&bytes, &file_name(&input))
                .with_context(|| format!("extract text: {}", input.display()))?;
            println!("{text}");
            Ok(())
        }
        Command::Roundtrip { input, output } => {
            let bytes = read_input(&input)?;
            let out = roundtrip_bytes(&bytes)
                .with_context(|| format!("round-trip: {}", input.display()))?;
            write_output(&output, &out)
        }
        command => {
            let settings = Settings::discover(args.config, &current_dir()).context("load config")?;
            run_with_settings(command, &settings)
        }
    }
}

fn run_with_settings(command: Command, settings: &Settings) -> anyhow::Result<()> {
    let engine = TemplateEngine::new(settings.catalog()?);

    match command {
        Command::Fill {
            template,
            template_file,
            values,
            set,
            output,
        } => {
            let values = collect_values(values.as_deref(), &set)?;
            let (bytes, label) = match (template, template_file) {
                (_, Some(path)) => {
                    let template = read_input(&path)?;
                    let filled = fill_bytes(&template, &values)
                        .with_context(|| format!("fill template: {}", path.display()))?;
                    (filled.bytes, file_stem(&path))
                }
                (Some(id), None) => {
                    let bytes = engine
                        .fill(&id, &values)
                        .with_context(|| format!("fill template: {id}"))?;
                    (bytes, id)
                }
                (None, None) => return Err(anyhow!("missing TEMPLATE or --template-file")),
            };
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{label}_filled.docx")));
            write_output(&output, &bytes)
        }
        Command::Templates { json } => {
            let summaries = engine.catalog().summaries();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summaries).context("serialize templates")?
                );
                return Ok(());
            }
            for s in summaries {
                println!("{:<12} {:<32} {:>3} fields", s.id, s.display_name, s.placeholder_count);
            }
            Ok(())
        }
        Command::Inspect {
            template,
            template_file,
        } => inspect(&engine, template, template_file),
        Command::Prompt { template, input } => {
            let info = engine.catalog().lookup(&template)?;
            let bytes = read_input(&input)?;
            let text = extract_text(&bytes, &file_name(&input))
                .with_context(|| format!("extract text: {}", input.display()))?;
            let prompt = build_extraction_prompt(&settings.prompts()?, info, &text);
            println!("=== system ===\n{}\n\n=== user ===\n{}", prompt.system, prompt.user);
            Ok(())
        }
        Command::Format {
            template,
            input,
            reply,
            output,
        } => {
            let extractor = JsonValuesExtractor::from_file(&reply)
                .with_context(|| format!("read reply: {}", reply.display()))?;
            let intake = Intake::new(engine, extractor, IntakeLimits::from_settings(settings));
            let upload = Upload {
                filename: file_name(&input),
                bytes: read_input(&input)?,
            };
            let formatted = intake.format_document(&template, &upload).map_err(|e| {
                anyhow!("format {} ({:?} error): {e}", input.display(), e.kind())
            })?;
            let output = output.unwrap_or_else(|| PathBuf::from(&formatted.filename));
            write_output(&output, &formatted.bytes)
        }
        Command::InitConfig { .. } | Command::ExtractText { .. } | Command::Roundtrip { .. } => {
            Err(anyhow!("command does not use the template catalog"))
        }
    }
}

fn inspect(
    engine: &TemplateEngine,
    template: Option<String>,
    template_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (path, declared) = match (template, template_file) {
        (_, Some(path)) => (path, None),
        (Some(id), None) => {
            let info = engine.catalog().lookup(&id)?;
            (info.file.clone(), Some(info.placeholders.clone()))
        }
        (None, None) => return Err(anyhow!("missing TEMPLATE or --template-file")),
    };

    let bytes = read_input(&path)?;
    let container = Container::read(&bytes).with_context(|| format!("open {}", path.display()))?;
    let inventory =
        placeholder_inventory(&container).with_context(|| format!("parse {}", path.display()))?;

    let mut found = std::collections::BTreeSet::new();
    for part in &inventory {
        println!(
            "{}: {} placeholders ({} distinct), {} runs merged",
            part.part,
            part.occurrences,
            part.keys.len(),
            part.merged_runs
        );
        for key in &part.keys {
            println!("  {key}");
        }
        found.extend(part.keys.iter().cloned());
    }

    if let Some(declared) = declared {
        let missing: Vec<&String> = declared.iter().filter(|k| !found.contains(*k)).collect();
        let undeclared: Vec<&String> = found.iter().filter(|k| !declared.contains(*k)).collect();
        if !missing.is_empty() {
            println!("declared but not in template: {}", join(&missing));
        }
        if !undeclared.is_empty() {
            println!("in template but not declared: {}", join(&undeclared));
        }
    }
    Ok(())
}

fn join(keys: &[&String]) -> String {
    keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
}

/// Values from a JSON object file, then `KEY=VALUE` pairs on top.
fn collect_values(json: Option<&Path>, set: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    if let Some(path) = json {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read values: {}", path.display()))?;
        let obj: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)
            .with_context(|| format!("values must be a JSON object: {}", path.display()))?;
        values.extend(obj.into_iter().map(|(k, v)| (k, stringify_value(v))));
    }
    for pair in set {
        let (k, v) = pair
            .split_once('=')
            .with_context(|| format!("--set expects KEY=VALUE, got {pair:?}"))?;
        values.insert(k.trim().to_string(), v.to_string());
    }
    Ok(values)
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read input: {}", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("write output: {}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload")
        .to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}
