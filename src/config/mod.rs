//! Configuration management for the records registry.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Section-wise validation
mod persistence;
mod registry;
mod sync;
pub use persistence::*;
pub use registry::*;
pub use sync::*;


use std::env;
use std::fmt::Debug;
use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_ENV_PREFIX;
use crate::Error;
use crate::Result;

/// Top-level settings of a records registry instance
///
/// Sources are merged in order, later ones winning:
/// 1. Default values from code
/// 2. Configuration file named by `CONFIG_PATH`
/// 3. `RECORDS__` environment variables
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct RecordsConfig {
    /// Table sizing and process role
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Snapshot and config file locations
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Periodic task intervals
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Debug for RecordsConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RecordsConfig")
            .field("registry", &self.registry)
            .field("persistence", &self.persistence)
            .finish()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

impl RecordsConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Validation is deferred so further overrides can be layered with
    /// `with_override_config()`; callers must call `validate()` last.
    ///
    /// ```ignore
    /// std::env::set_var("RECORDS__REGISTRY__ROLE", "manager");
    /// let cfg = RecordsConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional overrides from a file without validation.
    ///
    /// Merging order: current values, then the file, then the latest
    /// environment variables.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.registry.validate()?;
        self.persistence.validate()?;
        self.sync.validate()?;
        Ok(self)
    }
}

/// Ensures directory path is valid and writable
pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Config(ConfigError::Message(format!(
            "{name} path cannot be empty"
        ))));
    }

    #[cfg(not(test))]
    {
        use std::fs;
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                Error::Config(ConfigError::Message(format!(
                    "Failed to create {} directory at {}: {}",
                    name,
                    path.display(),
                    e
                )))
            })?;
        }

        let probe = path.join(".permission_test");
        fs::write(&probe, b"test").map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "No write permission in {} directory {}: {}",
                name,
                path.display(),
                e
            )))
        })?;
        fs::remove_file(&probe).ok();
    }

    Ok(())
}
