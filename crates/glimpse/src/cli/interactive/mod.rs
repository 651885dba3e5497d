//! Interactive mode: load the model once, then caption images one at a time.
//!
//! Entered with `glimpse interactive`, or bare `glimpse` on a terminal. This
//! is the terminal counterpart of an upload page: every submitted path goes
//! through the same intake and engine as `glimpse caption`.

pub mod theme;

use std::path::{Path, PathBuf};

use console::Style;
use dialoguer::{Confirm, Input, Select};
use glimpse_core::{CaptionError, Captioner, Config};

use super::models;

/// `Ok(Some(value))` on success, `Ok(None)` on interrupt (Ctrl+C / terminal
/// disconnect), `Err` for other I/O failures.
fn handle_interrupt<T>(result: dialoguer::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(dialoguer::Error::IO(e)) if e.kind() == std::io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e.into()),
    }
}

const MENU_ITEMS: &[&str] = &["Caption an image", "Show configuration", "Exit"];

#[derive(Debug, PartialEq, Eq)]
enum MenuAction {
    Caption,
    ShowConfig,
    Exit,
}

/// Map a menu prompt outcome to an action. Esc, Ctrl+C and "Exit" all leave.
fn menu_action(result: dialoguer::Result<Option<usize>>) -> anyhow::Result<MenuAction> {
    Ok(match handle_interrupt(result)?.flatten() {
        Some(0) => MenuAction::Caption,
        Some(1) => MenuAction::ShowConfig,
        _ => MenuAction::Exit,
    })
}

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    theme::print_banner(&config.model_name);

    if !models::is_installed(&config.model_path()) && !offer_download(&config).await? {
        return Ok(());
    }

    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_message(format!("Loading {}...", config.model_name));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    let loaded = Captioner::from_config(&config).await;
    spinner.finish_and_clear();
    let captioner = loaded?;

    let theme = theme::glimpse_theme();
    loop {
        let selection = Select::with_theme(&theme)
            .with_prompt("What would you like to do?")
            .items(MENU_ITEMS)
            .default(0)
            .interact_opt();

        match menu_action(selection)? {
            MenuAction::Caption => caption_prompt(&captioner).await?,
            MenuAction::ShowConfig => show_config(&config, config_path),
            MenuAction::Exit => break,
        }
    }

    Ok(())
}

async fn offer_download(config: &Config) -> anyhow::Result<bool> {
    let warn = Style::new().for_stderr().yellow();
    eprintln!(
        "  {} Model files for {} are not installed.",
        warn.apply_to("!"),
        config.model_name
    );

    let confirmed = handle_interrupt(
        Confirm::with_theme(&theme::glimpse_theme())
            .with_prompt("Download them now?")
            .default(true)
            .interact(),
    )?;
    if confirmed != Some(true) {
        return Ok(false);
    }

    models::download_model(config, &reqwest::Client::new()).await?;
    Ok(true)
}

/// Ask for paths until the user submits an empty one.
async fn caption_prompt(captioner: &Captioner) -> anyhow::Result<()> {
    let theme = theme::glimpse_theme();
    let ok = Style::new().for_stderr().green();
    let err = Style::new().for_stderr().red();
    let dim = Style::new().for_stderr().dim();

    loop {
        let input = handle_interrupt(
            Input::<String>::with_theme(&theme)
                .with_prompt("Image path (empty to go back)")
                .allow_empty(true)
                .interact_text(),
        )?;
        let Some(raw) = input.filter(|s| !s.trim().is_empty()) else {
            return Ok(());
        };

        let path = expand_path(raw.trim());
        match captioner.caption_file(&path).await {
            Ok(record) => {
                eprintln!();
                println!("  {} {}", ok.apply_to("✓"), record.caption);
                eprintln!(
                    "  {}",
                    dim.apply_to(format!(
                        "{}x{} {} · {}ms",
                        record.width, record.height, record.format, record.elapsed_ms
                    ))
                );
                eprintln!();
            }
            Err(e) => {
                eprintln!("  {} {}", err.apply_to("✗"), user_message(&e));
                eprintln!();
            }
        }
    }
}

/// Short, user-facing text for a failed caption.
fn user_message(error: &CaptionError) -> String {
    match error {
        CaptionError::FileNotFound(path) => format!("No file at {}", path.display()),
        CaptionError::UnsupportedFormat { .. } | CaptionError::Decode { .. } => {
            "That file is not a readable image.".to_string()
        }
        CaptionError::FileTooLarge { max_mb, .. } => {
            format!("That file is larger than {max_mb} MB.")
        }
        CaptionError::ImageTooLarge { max_dim, .. } => {
            format!("That image is larger than {max_dim}px on a side.")
        }
        CaptionError::Timeout { .. } => "Captioning took too long.".to_string(),
        other => format!("Error Generating Caption: {other}"),
    }
}

fn expand_path(input: &str) -> PathBuf {
    let unquoted = input.trim_matches(|c| c == '"' || c == '\'');
    PathBuf::from(shellexpand::tilde(unquoted).into_owned())
}

fn show_config(config: &Config, config_path: &Path) {
    let label = Style::new().for_stderr().bold();
    let cyan = Style::new().for_stderr().cyan();

    eprintln!();
    eprintln!("  {}", cyan.apply_to("Current configuration:"));
    eprintln!();
    eprintln!("    {:<16} {}", label.apply_to("Config file:"), config_path.display());
    eprintln!("    {:<16} {}", label.apply_to("Model:"), config.model_name);
    eprintln!(
        "    {:<16} {}",
        label.apply_to("Model dir:"),
        config.model_path().display()
    );
    eprintln!("    {:<16} {:?}", label.apply_to("Device:"), config.device);
    eprintln!(
        "    {:<16} max_length {}, {} beam(s)",
        label.apply_to("Generation:"),
        config.max_length,
        config.num_beams
    );
    eprintln!(
        "    {:<16} {}",
        label.apply_to("Log file:"),
        config.logging.file.display()
    );
    eprintln!();
}
