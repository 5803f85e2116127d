//! The `autotag models` command for fetching the CLIP encoders.

use std::path::{Path, PathBuf};

use autotag_core::embedding::{TEXT_MODEL_FILENAME, TOKENIZER_FILENAME, VISUAL_MODEL_FILENAME};
use autotag_core::{Config, OnnxEmbedder};
use clap::{Args, Subcommand};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download the vision encoder, text encoder and tokenizer
    Download {
        /// Model to fetch [default: `embedding.model` from config]
        #[arg(long)]
        model: Option<String>,
    },

    /// List known models and their install status
    List,

    /// Show model directory path
    Path,
}

/// A CLIP export on the Hugging Face hub.
#[derive(Debug)]
struct ModelSpec {
    name: &'static str,
    repo: &'static str,
    approx_mb: u32,
}

const MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "clip-vit-base-patch32",
        repo: "Xenova/clip-vit-base-patch32",
        approx_mb: 600,
    },
    ModelSpec {
        name: "clip-vit-base-patch16",
        repo: "Xenova/clip-vit-base-patch16",
        approx_mb: 600,
    },
];

/// Remote file → local file name inside the model directory.
const FILES: &[(&str, &str)] = &[
    ("onnx/vision_model.onnx", VISUAL_MODEL_FILENAME),
    ("onnx/text_model.onnx", TEXT_MODEL_FILENAME),
    ("tokenizer.json", TOKENIZER_FILENAME),
];

fn find_model(name: &str) -> anyhow::Result<&'static ModelSpec> {
    MODELS.iter().find(|m| m.name == name).ok_or_else(|| {
        let known: Vec<_> = MODELS.iter().map(|m| m.name).collect();
        anyhow::anyhow!(
            "Unknown model '{name}'. Known models: {}",
            known.join(", ")
        )
    })
}

/// Local files of a model directory that are not yet present.
fn missing_files(dir: &Path) -> Vec<&'static str> {
    FILES
        .iter()
        .map(|(_, local)| *local)
        .filter(|local| !dir.join(local).exists())
        .collect()
}

pub async fn execute(args: ModelsArgs) -> anyhow::Result<()> {
    let config = Config::load()?;

    match args.command {
        ModelsCommand::Download { model } => {
            let name = model.unwrap_or_else(|| config.embedding.model.clone());
            let spec = find_model(&name)?;
            let dir = config.model_dir().join(spec.name);
            download_model(spec, &dir).await?;
            tracing::info!("All downloads complete.");
        }

        ModelsCommand::List => {
            let model_dir = config.model_dir();
            println!("Models in {}:\n", model_dir.display());
            for spec in MODELS {
                let dir = model_dir.join(spec.name);
                let missing = missing_files(&dir);
                let status = if missing.is_empty() {
                    "ready".to_string()
                } else if missing.len() == FILES.len() {
                    "not installed".to_string()
                } else {
                    format!("incomplete (missing {})", missing.join(", "))
                };
                let marker = if spec.name == config.embedding.model {
                    "  (configured)"
                } else {
                    ""
                };
                println!(
                    "  - {:26} ~{:>4} MB  {}{}",
                    spec.name, spec.approx_mb, status, marker
                );
            }
            if !OnnxEmbedder::model_exists(&config.embedding, &model_dir) {
                println!("\nRun `autotag models download` to fetch the configured model.");
            }
        }

        ModelsCommand::Path => {
            println!(
                "{}",
                OnnxEmbedder::model_path(&config.embedding, &config.model_dir()).display()
            );
        }
    }

    Ok(())
}

/// Fetch every missing file of `spec` into `dir`.
async fn download_model(spec: &ModelSpec, dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let client = reqwest::Client::new();

    for (remote, local) in FILES {
        let dest = dir.join(local);
        if dest.exists() {
            tracing::info!("{} already exists at {:?}", local, dest);
            continue;
        }

        let url = format!("https://huggingface.co/{}/resolve/main/{}", spec.repo, remote);
        tracing::info!("Downloading {}...", local);
        tracing::info!("  Source: {}", url);
        tracing::info!("  Destination: {:?}", dest);

        download_file(&client, &url, &dest).await?;

        let size = tokio::fs::metadata(&dest).await?.len();
        tracing::info!(
            "  {} complete ({:.1} MB)",
            local,
            size as f64 / (1024.0 * 1024.0)
        );
    }

    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Stream `url` to `dest` via a `.part` file renamed into place when complete.
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

    let partial = partial_path(dest);
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
    file.sync_all().await?;
    drop(file);

    if let Some(total) = total_size {
        if downloaded != total {
            let _ = tokio::fs::remove_file(&partial).await;
            anyhow::bail!(
                "Download of {} truncated: got {} of {} bytes",
                url,
                downloaded,
                total
            );
        }
    }

    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}
