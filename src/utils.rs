use anyhow::{Error, Result, anyhow};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// JSON logs filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() -> Result<(), Error> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}
