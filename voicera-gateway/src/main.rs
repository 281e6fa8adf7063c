//! VoicEra Gateway - Main entry point.

use anyhow::Result;
use voicera_common::config::Config;
use voicera_common::logging::init_from_config;
use voicera_common::validation::Validate;

#[tokio::main]
async fn main() -> Result<()> {
    // Config file (VOICERA_CONFIG or ~/.voicera/config.json) plus env overrides
    let config = Config::load_with_env(None)?;
    config.validate()?;

    init_from_config(&config.observability);

    tracing::info!("VoicEra Gateway v{}", env!("CARGO_PKG_VERSION"));

    voicera_gateway::start_server(&config).await
}
