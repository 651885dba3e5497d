//! Glimpse CLI - caption images with a pretrained vision-encoder-decoder model.
//!
//! # Usage
//!
//! ```bash
//! # Fetch the configured model
//! glimpse models download
//!
//! # Caption a single image
//! glimpse caption dog.jpg
//!
//! # Caption a directory
//! glimpse caption ./photos/ --format jsonl --output captions.jsonl
//!
//! # Caption images one at a time
//! glimpse interactive
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use glimpse_core::Config;

mod cli;
mod logging;

/// Glimpse - image captioning with pretrained vision-encoder-decoder models.
#[derive(Parser, Debug)]
#[command(name = "glimpse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (YAML, or TOML by extension)
    #[arg(long, global = true, env = "GLIMPSE_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Caption an image or every image in a directory
    Caption(cli::caption::CaptionArgs),

    /// Load the model once and caption images on request
    Interactive,

    /// Download and inspect model files
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Only the logging section is read here; the full config is loaded (and
    // its outcome logged) by each command.
    let _guard = logging::init(
        &Config::logging_settings(&cli.config),
        cli.verbose,
        cli.json_logs,
    )?;

    tracing::debug!("Glimpse v{}", glimpse_core::VERSION);

    match cli.command {
        Some(Commands::Caption(args)) => cli::caption::execute(args, &cli.config).await,
        Some(Commands::Models(args)) => cli::models::execute(args, &cli.config).await,
        Some(Commands::Config(args)) => cli::config::execute(args, &cli.config).await,
        Some(Commands::Interactive) => cli::interactive::run(&cli.config).await,
        None if std::io::stdin().is_terminal() => cli::interactive::run(&cli.config).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
