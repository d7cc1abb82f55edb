// File: azsnap/src/config/manager.rs
use super::{Config, Overrides};
use crate::constants::files;
use crate::errors::ConfigError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `config/azsnap.toml` is used
    /// when present and built-in defaults otherwise.
    pub async fn new(path: Option<PathBuf>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let (mut config, source) = match path {
            Some(path) => (Self::load_file(&path).await?, Some(path)),
            None => {
                let default_path = PathBuf::from(files::DEFAULT_CONFIG_PATH);
                if fs::try_exists(&default_path).await.unwrap_or(false) {
                    (Self::load_file(&default_path).await?, Some(default_path))
                } else {
                    debug!("No config file found, using built-in defaults");
                    (Config::default(), None)
                }
            }
        };

        config.apply_overrides(overrides);
        config.validate()?;

        match &source {
            Some(path) => info!("Configuration loaded from {}", path.display()),
            None => info!("Configuration: built-in defaults"),
        }

        Ok(Self {
            current_config: Arc::new(config),
            source,
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    async fn load_file(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}
