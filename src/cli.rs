//! Command-line surface for the `altscan` binary.
//!
//! `annotate` runs one engine start/stop cycle over a document snapshot file;
//! `words` exercises the word provider directly.

use crate::config::AltscanConfig;
use crate::document::{Document, DocumentSnapshot};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::styler::NoopStyler;
use crate::word_source::{FixedWordSource, HttpWordSource, WordSource};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "altscan", version, about = "Annotate images that lack alternative text")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level override (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format override (text, json)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Annotate a document snapshot (JSON) and print the result
    Annotate {
        /// Snapshot file to read
        input: PathBuf,

        /// Replace alt text the engine did not generate
        #[arg(long)]
        overwrite: bool,

        /// Use the configured fallback word instead of the provider
        #[arg(long)]
        offline: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,

        /// Also write the annotated snapshot to this file
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Fetch a batch of words from the provider
    Words {
        count: usize,

        #[arg(long)]
        offline: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

fn word_source(config: &AltscanConfig, offline: bool) -> Result<Arc<dyn WordSource>, EngineError> {
    if offline {
        Ok(Arc::new(FixedWordSource::new(
            config.word_source.fallback_word.clone(),
        )))
    } else {
        Ok(Arc::new(HttpWordSource::new(&config.word_source)?))
    }
}

/// Run a parsed command, returning its printable output
pub async fn execute(command: &Commands, config: &AltscanConfig) -> Result<String, EngineError> {
    match command {
        Commands::Annotate {
            input,
            overwrite,
            offline,
            output,
            write,
        } => {
            let document = load_snapshot(input)?;
            let engine = Engine::builder(document.clone())
                .config(config)
                .overwrite_existing(*overwrite || config.engine.overwrite_existing)
                .word_source(word_source(config, *offline)?)
                .styler(Arc::new(NoopStyler))
                .build()?;

            let handle = engine.start().await?;
            handle.stop();
            let report = handle.initial_report();
            info!(
                candidates = report.candidates,
                annotated = report.annotated,
                "Annotated snapshot"
            );

            let snapshot = document.snapshot();
            if let Some(path) = write {
                std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
            }
            match output {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&snapshot)?),
                OutputFormat::Table => Ok(render_table(&document, engine.marker_attribute())),
            }
        }
        Commands::Words { count, offline } => {
            let batch = word_source(config, *offline)?.fetch_words(*count).await;
            Ok(batch.words().join("\n"))
        }
    }
}

pub fn load_snapshot(path: &Path) -> Result<Document, EngineError> {
    let raw = std::fs::read_to_string(path)?;
    let snapshot: DocumentSnapshot = serde_json::from_str(&raw)?;
    Ok(Document::from_snapshot(&snapshot)?)
}

/// One row per image: position, source, alt text and whether the engine generated it
pub fn render_table(document: &Document, marker_attribute: &str) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["#", "src", "alt", "generated"]);
    for (index, image) in document.images().iter().enumerate() {
        table.add_row(vec![
            (index + 1).to_string(),
            image.attribute("src").unwrap_or_default(),
            image.attribute("alt").unwrap_or_default(),
            if image.has_attribute(marker_attribute) {
                "yes".to_string()
            } else {
                "no".to_string()
            },
        ]);
    }
    table.to_string()
}

/// Map an error to a user-facing message
pub fn map_error(err: &EngineError) -> String {
    match err {
        EngineError::Io(e) => format!("File error: {}", e),
        EngineError::Snapshot(e) => format!("Could not read document snapshot: {}", e),
        EngineError::ConfigError(msg) => format!("Configuration problem: {}", msg),
        other => other.to_string(),
    }
}
