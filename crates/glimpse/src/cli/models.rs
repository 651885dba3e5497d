//! The `glimpse models` command for fetching and inspecting model files.

use std::path::Path;

use anyhow::Context;
use clap::{Args, Subcommand};
use glimpse_core::caption::onnx::{ModelFile, MODEL_FILES};
use glimpse_core::Config;

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download the ONNX export of the configured model from the HuggingFace hub
    Download,

    /// Show which model files are installed
    List,

    /// Show the directory holding the configured model
    Path,
}

const HUB_URL: &str = "https://huggingface.co";

pub async fn execute(args: ModelsArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    match args.command {
        ModelsCommand::Download => {
            let client = reqwest::Client::new();
            download_model(&config, &client).await?;
            tracing::info!("All downloads complete.");
        }

        ModelsCommand::List => {
            let model_path = config.model_path();
            println!("Model: {}", config.model_name);
            println!("  Directory: {}\n", model_path.display());
            for file in MODEL_FILES {
                let status = if model_path.join(file.local).exists() {
                    "ready"
                } else {
                    "not installed"
                };
                println!("    - {:30} {}", file.local, status);
            }
            if !is_installed(&model_path) {
                println!("\nRun `glimpse models download` to fetch missing files.");
            }
        }

        ModelsCommand::Path => {
            println!("{}", config.model_path().display());
        }
    }

    Ok(())
}

/// True when every file the engine needs is on disk.
pub fn is_installed(model_path: &Path) -> bool {
    MODEL_FILES.iter().all(|f| model_path.join(f.local).exists())
}

/// Fetch every missing model file. Files already present are skipped.
pub async fn download_model(config: &Config, client: &reqwest::Client) -> anyhow::Result<()> {
    let model_path = config.model_path();
    std::fs::create_dir_all(&model_path)
        .with_context(|| format!("Cannot create {}", model_path.display()))?;

    for file in MODEL_FILES {
        let dest = model_path.join(file.local);
        if dest.exists() {
            tracing::info!("{} already exists at {:?}", file.local, dest);
            continue;
        }

        let url = file_url(&config.model_name, file);
        tracing::info!("Downloading {}...", file.local);
        tracing::info!("  Source: {}", url);
        tracing::info!("  Destination: {:?}", dest);

        download_file(client, &url, &dest).await?;

        let size = std::fs::metadata(&dest)?.len();
        tracing::info!(
            "  {} complete ({:.1} MB)",
            file.local,
            size as f64 / (1024.0 * 1024.0)
        );
    }

    Ok(())
}

fn file_url(model_name: &str, file: &ModelFile) -> String {
    format!("{HUB_URL}/{model_name}/resolve/main/{}", file.remote)
}

/// Stream a URL to `dest` through a `.part` file, renamed once complete, so
/// an interrupted download never looks installed.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        tracing::info!("  Size: {:.1} MB", size as f64 / (1024.0 * 1024.0));
    }

    let partial = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total_size {
            if downloaded % (50 * 1024 * 1024) < chunk.len() as u64 {
                tracing::info!(
                    "  Progress: {:.0}%",
                    downloaded as f64 / total as f64 * 100.0
                );
            }
        }
    }

    file.flush().await?;
    drop(file);
    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url() {
        let url = file_url("Xenova/vit-gpt2-image-captioning", &MODEL_FILES[0]);
        assert_eq!(
            url,
            "https://huggingface.co/Xenova/vit-gpt2-image-captioning/resolve/main/onnx/encoder_model.onnx"
        );
    }

    #[test]
    fn test_is_installed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_installed(dir.path()));
        for file in MODEL_FILES {
            std::fs::write(dir.path().join(file.local), b"").unwrap();
        }
        assert!(is_installed(dir.path()));
    }
}
