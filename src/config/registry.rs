use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::ProcessRole;
use crate::Result;

/// Record table settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Hard capacity of the record table; it never grows past this.
    ///
    /// Default: 10000
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Role of this process, which decides the categories it owns.
    ///
    /// Default: `standalone`
    #[serde(default)]
    pub role: ProcessRole,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            role: ProcessRole::default(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_records must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_max_records() -> usize {
    10_000
}
