use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Intervals of the periodic registry tasks, in milliseconds
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Raw-stat block sync into stat records
    #[serde(default = "default_raw_stat_sync_interval_ms")]
    pub raw_stat_sync_interval_ms: u64,

    /// Config update-callback sweep
    #[serde(default = "default_config_update_interval_ms")]
    pub config_update_interval_ms: u64,

    /// Push to peer, stats snapshot and config text write
    #[serde(default = "default_remote_sync_interval_ms")]
    pub remote_sync_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            raw_stat_sync_interval_ms: default_raw_stat_sync_interval_ms(),
            config_update_interval_ms: default_config_update_interval_ms(),
            remote_sync_interval_ms: default_remote_sync_interval_ms(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("raw_stat_sync_interval_ms", self.raw_stat_sync_interval_ms),
            ("config_update_interval_ms", self.config_update_interval_ms),
            ("remote_sync_interval_ms", self.remote_sync_interval_ms),
        ] {
            if v == 0 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "{name} must be greater than 0"
                ))));
            }
        }
        Ok(())
    }

    pub fn raw_stat_sync_interval(&self) -> Duration {
        Duration::from_millis(self.raw_stat_sync_interval_ms)
    }

    pub fn config_update_interval(&self) -> Duration {
        Duration::from_millis(self.config_update_interval_ms)
    }

    pub fn remote_sync_interval(&self) -> Duration {
        Duration::from_millis(self.remote_sync_interval_ms)
    }
}

fn default_raw_stat_sync_interval_ms() -> u64 {
    5000
}
fn default_config_update_interval_ms() -> u64 {
    3000
}
fn default_remote_sync_interval_ms() -> u64 {
    5000
}
