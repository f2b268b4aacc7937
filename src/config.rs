use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::HashAlgorithm;

/// Environment prefix read by [`RingConfig::load`].
pub const ENV_PREFIX: &str = "ZRING";

/// Ring construction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Virtual replicas per node used by `add`.
    pub default_replicas: usize,
    /// Hash used for node and key placement.
    pub hash: HashAlgorithm,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            default_replicas: 1,
            hash: HashAlgorithm::Crc32,
        }
    }
}

impl RingConfig {
    /// Loads defaults overridden by `ZRING_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(None, ENV_PREFIX)
    }

    /// Loads defaults, then the given file (toml/json/yaml by extension),
    /// then `ZRING_*` environment variables.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::build(Some(path.as_ref()), ENV_PREFIX)
    }

    /// Checks values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_replicas < 1 {
            return Err(ConfigError::Message(
                "default_replicas must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn build(
        file: Option<&Path>,
        prefix: &str,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("default_replicas", defaults.default_replicas as u64)?
            .set_default("hash", defaults.hash.as_str())?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg: Self = builder
            .add_source(Environment::with_prefix(prefix).try_parsing(true))
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }
}
