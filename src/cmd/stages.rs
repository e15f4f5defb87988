//! Stage catalog listing: `partsmith stages`.

use anyhow::{Context, Result};
use partsmith::catalog::StageCatalog;
use partsmith::config::PartsmithConfig;

pub fn cmd_stages(config: &PartsmithConfig) -> Result<()> {
    let catalog = StageCatalog::load_or_default(config.pipeline.catalog.as_deref())
        .context("Failed to load stage catalog")?;

    match &config.pipeline.catalog {
        Some(path) => println!("Stage catalog: {}", path.display()),
        None => println!("Stage catalog: built-in tutorial"),
    }
    println!();
    for stage in catalog.stages() {
        println!("{:>3}  {}", stage.ordinal, stage.title);
    }
    println!();
    println!("{} stages", catalog.len());
    Ok(())
}
