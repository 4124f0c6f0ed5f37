//! Serializable runner configuration.
//!
//! A single TOML document configures sampling, seeding and the cone/BEST
//! post-processing. Every section has defaults, so an empty file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use conelab_core::InferenceConfig;

/// Master seed used when none is configured.
pub const DEFAULT_SEED: u64 = 42;

/// Draws used for cone generation and `run_model`.
pub const CONE_SAMPLES: usize = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Cone generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConeConfig {
    /// Posterior draws used to simulate forward returns.
    pub samples: usize,
    /// Trailing training observations shown alongside the cone.
    pub plot_train_len: usize,
}

impl Default for ConeConfig {
    fn default() -> Self {
        Self {
            samples: CONE_SAMPLES,
            plot_train_len: 50,
        }
    }
}

/// BEST summary settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BestConfig {
    /// Leading draws discarded before summarizing.
    pub burn: usize,
}

impl Default for BestConfig {
    fn default() -> Self {
        Self { burn: 200 }
    }
}

/// Complete runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Master seed for the run-level RNG hierarchy.
    pub seed: u64,
    pub inference: InferenceConfig,
    pub cone: ConeConfig,
    pub best: BestConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            inference: InferenceConfig::default(),
            cone: ConeConfig::default(),
            best: BestConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunnerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the sampler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let inf = &self.inference;
        if inf.max_tree_depth == 0 {
            return Err(ConfigError::Invalid("max_tree_depth must be at least 1".into()));
        }
        if !(inf.target_accept > 0.0 && inf.target_accept < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "target_accept must lie in (0, 1), got {}",
                inf.target_accept
            )));
        }
        if inf.samples == 0 || self.cone.samples == 0 {
            return Err(ConfigError::Invalid("sample counts must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        let config = RunnerConfig::from_toml("").unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.inference.samples, 2000);
        assert_eq!(config.cone.samples, 500);
        assert_eq!(config.best.burn, 200);
    }

    #[test]
    fn partial_sections_override_defaults() {
        let config = RunnerConfig::from_toml(
            r#"
seed = 7

[inference]
samples = 300
warmup = 100

[cone]
plot_train_len = 20
"#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.inference.samples, 300);
        assert_eq!(config.inference.warmup, 100);
        assert_eq!(config.inference.max_tree_depth, 10);
        assert_eq!(config.cone.plot_train_len, 20);
        assert_eq!(config.cone.samples, 500);
    }

    #[test]
    fn toml_round_trip() {
        let config = RunnerConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(RunnerConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn invalid_target_accept_rejected() {
        let err = RunnerConfig::from_toml("[inference]\ntarget_accept = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "seed = 99").unwrap();
        let config = RunnerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.seed, 99);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RunnerConfig::from_file(Path::new("/nonexistent/conelab.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
