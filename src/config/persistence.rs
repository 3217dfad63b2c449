use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::validate_directory;
use crate::Error;
use crate::Result;

/// On-disk locations for the stats snapshot and the config text file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistenceConfig {
    /// Directory holding both files
    ///
    /// Default: `/tmp/records`
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Binary snapshot of persistent stats
    #[serde(default = "default_stats_snapshot_file")]
    pub stats_snapshot_file: String,

    /// Text dump of config records
    #[serde(default = "default_config_file")]
    pub config_file: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: default_snapshot_dir(),
            stats_snapshot_file: default_stats_snapshot_file(),
            config_file: default_config_file(),
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<()> {
        validate_directory(&self.snapshot_dir, "snapshot_dir")?;

        for (name, file) in [
            ("stats_snapshot_file", &self.stats_snapshot_file),
            ("config_file", &self.config_file),
        ] {
            if file.trim().is_empty() {
                return Err(Error::Config(ConfigError::Message(format!(
                    "{name} cannot be empty"
                ))));
            }
        }
        if self.stats_snapshot_file == self.config_file {
            return Err(Error::Config(ConfigError::Message(
                "stats_snapshot_file and config_file must differ".into(),
            )));
        }
        Ok(())
    }

    pub fn stats_snapshot_path(&self) -> PathBuf {
        self.snapshot_dir.join(&self.stats_snapshot_file)
    }

    pub fn config_path(&self) -> PathBuf {
        self.snapshot_dir.join(&self.config_file)
    }
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("/tmp/records")
}
fn default_stats_snapshot_file() -> String {
    "records.snap".to_string()
}
fn default_config_file() -> String {
    "records.config".to_string()
}
