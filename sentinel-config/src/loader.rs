use std::path::{Path, PathBuf};

use config::{Config as RawConfig, ConfigError as RawConfigError, Environment, File};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::Config;
use crate::validation::{self, ConfigError};

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &[
    "sentinel.toml",
    "config/sentinel.toml",
    "/etc/sentinel/sentinel.toml",
];

const ENV_PREFIX: &str = "SENTINEL";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {0}")]
    MissingConfig(PathBuf),
    #[error("failed to compose configuration sources")]
    Source(#[from] RawConfigError),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Loaded configuration plus anything worth telling the operator about
/// (e.g. no config file found, falling back to defaults + env).
#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: Vec<String>,
}

/// Composes a [`Config`] from, in ascending priority: built-in defaults,
/// an optional TOML file, then `SENTINEL_*` environment variables.
/// Mirrors the teacher's file-then-env layering, swapping `dotenvy` +
/// hand-rolled merge structs for the `config` crate's own layering.
#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = Vec::new();

        let resolved = self.resolve_path(&mut warnings)?;

        let defaults = RawConfig::try_from(&Config::default())?;
        let mut builder = RawConfig::builder().add_source(defaults);

        if let Some(path) = &resolved {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(File::from(path.as_path()));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let composed = builder.build()?;
        let config: Config = composed.try_deserialize()?;

        validation::validate(&config)?;

        Ok(ConfigLoad { config, warnings })
    }

    fn resolve_path(
        &self,
        warnings: &mut Vec<String>,
    ) -> Result<Option<PathBuf>, ConfigLoadError> {
        if let Some(explicit) = &self.config_path {
            if !explicit.exists() {
                return Err(ConfigLoadError::MissingConfig(explicit.clone()));
            }
            return Ok(Some(explicit.clone()));
        }

        let found = DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(Path::new)
            .find(|candidate| candidate.exists())
            .map(Path::to_path_buf);

        if found.is_none() {
            warn!("no configuration file found; using defaults + environment");
            warnings.push(
                "no sentinel.toml found in default locations; running on defaults + environment"
                    .to_string(),
            );
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_defaults_without_a_file() {
        let load = ConfigLoader::new().load().expect("load should succeed");
        assert_eq!(load.config, Config::default());
        assert!(!load.warnings.is_empty());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let loader = ConfigLoader::new().with_config_path("/nonexistent/sentinel.toml");
        assert!(matches!(
            loader.load(),
            Err(ConfigLoadError::MissingConfig(_))
        ));
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[core]\nbuffer_size = 8192\nmax_events = 200000\nrate_limit = 0\nworker_threads = 8\n").unwrap();

        let loader = ConfigLoader::new().with_config_path(file.path());
        let load = loader.load().expect("load should succeed");
        assert_eq!(load.config.core.buffer_size, 8192);
        assert_eq!(load.config.core.worker_threads, 8);
    }
}
