//! HTTP service command: `partsmith serve`.

use anyhow::Result;
use partsmith::config::PartsmithConfig;

pub async fn cmd_serve(config: PartsmithConfig) -> Result<()> {
    partsmith::server::start_server(config).await
}
