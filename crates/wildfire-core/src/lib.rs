pub mod config;
pub mod error;

pub use config::{
    CacheConfig, Config, LocationConfig, ProviderConfig, TimeoutConfig, ValidationResult,
};
pub use error::{
    AppError, ConfigError, NetworkError, ReqwestErrorExt, RiskServiceError, RusqliteErrorExt,
    StorageError,
};

use anyhow::Result;

/// Initialize logging for the application.
///
/// Honours `RUST_LOG`; defaults to `info`.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("WildFire core initialized");
    Ok(())
}
