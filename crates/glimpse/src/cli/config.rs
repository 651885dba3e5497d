//! The `glimpse config` command.

use std::path::Path;

use clap::{Args, Subcommand};
use glimpse_core::Config;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display the loaded configuration
    Show,

    /// Show the config file path
    Path,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

pub async fn execute(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = super::load_config(config_path)?;
            print!("{}", config.to_yaml()?);
        }

        ConfigCommand::Path => {
            let note = if config_path.exists() { "" } else { " (not created yet)" };
            println!("{}{note}", config_path.display());
        }

        ConfigCommand::Init { force } => {
            write_default(config_path, force)?;
            tracing::info!("Config file created at: {}", config_path.display());
            println!("Configuration initialized at: {}", config_path.display());
        }
    }

    Ok(())
}

/// Write `Config::default()` to `path`, in TOML when the extension says so.
fn write_default(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let config = Config::default();
    let is_toml = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    let content = if is_toml {
        config.to_toml()?
    } else {
        config.to_yaml()?
    };
    std::fs::write(path, content)?;
    Ok(())
}
