pub mod config;
pub mod error;
pub mod state;

pub use config::{CacheConfig, Config, WeatherConfig};
pub use error::{DatabaseError, NetworkError, ReqwestErrorExt, RusqliteErrorExt};
pub use state::FetchState;

use anyhow::Result;

/// Initialize the core application
pub fn init() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Nimbus core initialized");
    Ok(())
}
