//! Command-line interface.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::models::LanguageConfig;

#[derive(Parser)]
#[command(name = "textlift")]
#[command(about = "Scanned-document text recognition pipeline")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "TEXTLIFT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize a document and print or export its text
    Run {
        /// Image or PDF file to recognize
        input: PathBuf,

        /// Language models, `+`-joined (e.g. tam_new+eng)
        #[arg(short, long)]
        langs: Option<LanguageConfig>,

        /// Confidence threshold for the exported text (0-100)
        #[arg(short, long)]
        threshold: Option<u8>,

        /// Number of recognition workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Rasterization resolution for PDF pages
        #[arg(long)]
        dpi: Option<u32>,

        /// Write the concatenated text to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print a JSON summary of the run instead of page text
        #[arg(long)]
        json: bool,
    },

    /// Check availability of the external recognition tools
    Tools,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Run {
            input,
            langs,
            threshold,
            workers,
            dpi,
            output,
            json,
        } => {
            if let Some(langs) = langs {
                config = config.with_languages(langs);
            }
            if let Some(threshold) = threshold {
                config = config.with_threshold(threshold);
            }
            if let Some(workers) = workers {
                config = config.with_workers(workers);
            }
            if let Some(dpi) = dpi {
                config = config.with_dpi(dpi);
            }
            commands::cmd_run(config, &input, output.as_deref(), json).await
        }
        Commands::Tools => commands::cmd_tools(),
    }
}
