//! Configuration management for pkgforge
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use pkgforge::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Cloning into: {}", config.acquire.clone_root.display());
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `PKGFORGE__<section>__<key>`:
//! - `PKGFORGE__ACQUIRE__CLONE_ROOT=/var/cache/sources`
//! - `PKGFORGE__HASHING__CHUNK_SIZE=1MB`
//! - `PKGFORGE__ORCHESTRATOR__MAX_CONCURRENT=8`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/pkgforge.toml`.
//! This can be overridden using the `PKGFORGE_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    AcquireConfig, BootstrapConfig, Config, HashingConfig, OrchestratorConfig, OverrideConfig,
    ToolsConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path (plus environment overrides)
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
