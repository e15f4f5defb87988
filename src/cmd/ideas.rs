//! Project ideas from a photo: `partsmith ideas <IMAGE>`.

use anyhow::{Context, Result, bail};
use partsmith::config::PartsmithConfig;
use partsmith::ideas::IdeasService;
use partsmith::model::build_client;
use partsmith::storage::image_ref_for_path;
use std::path::Path;

pub async fn cmd_ideas(config: &PartsmithConfig, image: &Path) -> Result<()> {
    if !image.is_file() {
        bail!("Image not found: {}", image.display());
    }

    let model = build_client(&config.model).context("Failed to create model client")?;
    let service = IdeasService::new(model);
    let report = service
        .analyze(image_ref_for_path(image))
        .await
        .context("Image analysis failed")?;

    if report.is_empty() {
        bail!("Failed to generate project ideas");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
