//! Runtime image commands: check that it is present, or pull it.

use anyhow::{bail, Context, Result};
use bollard::image::CreateImageOptions;
use clap::Subcommand;
use futures_util::StreamExt;
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::sandbox::DockerBackend;

/// Image management actions.
#[derive(Subcommand, Debug)]
pub(crate) enum ImageAction {
    /// Pull the runtime image from a registry
    Pull {
        /// Image to pull (default: sandbox.image from coderun.toml)
        #[arg(long)]
        image: Option<String>,

        /// Pull even if the image exists locally
        #[arg(long)]
        force: bool,
    },

    /// Show whether the runtime image is present locally
    Status {
        /// Image to check (default: sandbox.image from coderun.toml)
        #[arg(long)]
        image: Option<String>,
    },
}

/// Run image management command.
pub(crate) async fn run(config_path: Option<&Path>, action: ImageAction) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd, config_path)?;

    let backend = DockerBackend::connect()
        .await
        .context("Docker is not available")?;

    match action {
        ImageAction::Pull { image, force } => {
            let image = image.unwrap_or(config.sandbox.image);
            pull_image(&backend, &image, force).await
        }
        ImageAction::Status { image } => {
            let image = image.unwrap_or(config.sandbox.image);
            show_image_status(&backend, &image).await
        }
    }
}

async fn pull_image(backend: &DockerBackend, image: &str, force: bool) -> Result<()> {
    if !force && !backend.find_images(image).await?.is_empty() {
        info!("Image '{}' found locally, skipping pull", image);
        println!("Image '{image}' already exists locally.");
        println!("Use --force to pull anyway.");
        return Ok(());
    }

    info!("Pulling image {}...", image);

    let options = CreateImageOptions {
        from_image: image,
        ..Default::default()
    };
    let mut stream = backend.docker().create_image(Some(options), None, None);
    let mut last_output = String::new();

    while let Some(chunk) = stream.next().await {
        let output = chunk.with_context(|| format!("Error pulling image {image}"))?;
        if let Some(error) = output.error {
            bail!("Docker pull error: {error}");
        }
        if let Some(status) = output.status {
            let trimmed = status.trim();
            if !trimmed.is_empty() {
                println!("{trimmed}");
                last_output = trimmed.to_string();
            }
        }
    }

    if last_output.contains("Downloaded") || last_output.contains("up to date") {
        info!("Image pulled successfully: {}", image);
    } else {
        warn!("Pull completed, but success message not found.");
    }

    Ok(())
}

async fn show_image_status(backend: &DockerBackend, image: &str) -> Result<()> {
    let matching = backend.find_images(image).await?;

    if matching.is_empty() {
        println!("Image not found: {image}");
        println!("\nBuild it with the runtime's Dockerfile, or pull it with:");
        println!("  coderun image pull");
        return Ok(());
    }

    println!("Image: {image}");
    println!("Status: Found");

    for img in matching {
        println!("Size: {}", format_size(img.size));
        println!("Created: {}", img.created);
        if !img.repo_tags.is_empty() {
            println!("Tags: {}", img.repo_tags.join(", "));
        }
        println!("ID: {}", img.id);
    }

    Ok(())
}

/// Human-readable image size
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: i64) -> String {
    let megabytes = bytes.unsigned_abs() as f64 / 1_048_576.0;
    let gigabytes = megabytes / 1024.0;
    if gigabytes >= 1.0 {
        format!("{gigabytes:.2} GB ({megabytes:.2} MB)")
    } else {
        format!("{megabytes:.2} MB")
    }
}
