//! The `glimpse caption` command: caption one image or a directory of images.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, ValueEnum};
use glimpse_core::{CaptionStats, Captioner, FileDiscovery, OutputFormat, OutputWriter};
use indicatif::{ProgressBar, ProgressStyle};

/// Arguments for the `caption` command.
#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image file or directory of images
    pub input: PathBuf,

    /// Write records to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    /// A JSON array
    Json,
    /// One JSON object per line
    Jsonl,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Jsonl => OutputFormat::JsonLines,
        }
    }
}

pub async fn execute(args: CaptionArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    let files = FileDiscovery::default().discover(&args.input);
    if files.is_empty() {
        anyhow::bail!("No supported images found at {}", args.input.display());
    }
    tracing::info!("Found {} image(s) to caption", files.len());

    let captioner = Captioner::from_config(&config).await?;

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = OutputWriter::new(BufWriter::new(sink), args.format.into());

    let progress = (files.len() > 1).then(|| create_progress_bar(files.len() as u64));
    let start = Instant::now();
    let mut stats = CaptionStats::default();

    for path in &files {
        if let Some(pb) = &progress {
            pb.set_message(display_name(path));
        }

        match captioner.caption_file(path).await {
            Ok(record) => {
                writer.write(&record)?;
                stats.succeeded += 1;
            }
            Err(e) => {
                tracing::error!("{e}");
                stats.failed += 1;
            }
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    writer.finish()?;
    stats.elapsed = start.elapsed();

    if let Some(pb) = progress {
        pb.finish_and_clear();
        print_summary(&stats);
    }

    if stats.succeeded == 0 {
        anyhow::bail!("No images were captioned ({} failed)", stats.failed);
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .map(|s| s.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

fn print_summary(stats: &CaptionStats) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Captioned:    {:>8}", stats.succeeded);
    if stats.failed > 0 {
        eprintln!("    Failed:       {:>8}", stats.failed);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", stats.total());
    eprintln!("    Duration:     {:>7.1}s", stats.elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} img/sec", stats.rate());
    eprintln!("  ====================================");
}
