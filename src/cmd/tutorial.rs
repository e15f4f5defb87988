//! Tutorial generation: `partsmith tutorial <PROJECT>`.
//!
//! Streams NDJSON events to stdout as they arrive, the same lines the HTTP
//! endpoint sends.

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use partsmith::config::PartsmithConfig;
use partsmith::export::write_markdown;
use partsmith::model::build_client;
use partsmith::pipeline::PipelineOrchestrator;
use partsmith::storage::image_ref_for_path;
use partsmith_common::ProjectRequest;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub async fn cmd_tutorial(
    config: &PartsmithConfig,
    project: &str,
    image: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let mut request = ProjectRequest::new(project);
    if let Some(path) = image {
        if !path.is_file() {
            bail!("Image not found: {}", path.display());
        }
        request = request.with_image(image_ref_for_path(path));
    }

    let model = build_client(&config.model).context("Failed to create model client")?;
    let orchestrator = PipelineOrchestrator::from_config(&config.pipeline, model)
        .context("Failed to load stage catalog")?;
    let (mut events, document) = orchestrator.run_with_document(request)?;

    let mut stdout = tokio::io::stdout();
    while let Some(event) = events.next().await {
        let line = event.to_ndjson_line()?;
        stdout
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to stdout")?;
        stdout.flush().await?;
    }

    if let Some(path) = output {
        let document = document
            .await
            .context("Pipeline ended before the tutorial was complete")?;
        write_markdown(&document, path)
            .await
            .with_context(|| format!("Failed to write tutorial to {}", path.display()))?;
        info!(path = %path.display(), "Tutorial written");
    }
    Ok(())
}
