use std::time::Duration;

use imgnow_api::setup;
use imgnow_core::{telemetry, Config};

// mimalloc keeps fragmentation low with large upload buffers, especially on musl.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// How long shutdown waits for in-flight embedded transcodes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    telemetry::init_telemetry()
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let config = Config::from_env()?;

    let (_state, router, background) = setup::initialize_app(config.clone()).await?;

    setup::server::start_server(&config, router).await?;

    background.shutdown(DRAIN_TIMEOUT).await;
    Ok(())
}
