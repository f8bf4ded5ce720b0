//! USSD Router - Main entry point.

use anyhow::Result;
use std::sync::Arc;
use ussd_common::config::Config;
use ussd_common::logging::init_logging;
use ussd_router::{demo, AdapterRegistry, EngineBuilder};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("USSD Router v{}", env!("CARGO_PKG_VERSION"));

    let mut builder = EngineBuilder::from_config(&config, &AdapterRegistry::with_defaults())?
        .menu(demo::menu()?);
    // Files from the configured template directory override the built-in sources.
    for (name, source) in demo::template_sources() {
        if !builder.has_template(name) {
            builder = builder.template(name, &source)?;
        }
    }
    let engine = Arc::new(builder.build()?);

    ussd_router::start_server(&config, engine).await
}
