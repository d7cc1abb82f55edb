// File: azsnap/src/config/mod.rs
pub mod manager;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{azure, batch, files, retry, snapshot};
use crate::errors::ConfigError;

pub use manager::ConfigManager;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub azure: AzureConfig,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    pub snapshot: SnapshotConfig,
    pub output: OutputConfig,
}

/// Which transport talks to Azure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// `az` subprocess per call
    #[default]
    Cli,
    /// Direct HTTPS calls to Azure Resource Manager
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub backend: Backend,
    pub az_binary: String,
    pub management_endpoint: String,
    pub snapshot_api_version: String,
    pub vm_api_version: String,
    pub request_timeout_seconds: u64,
    pub provision_poll_interval_seconds: u64,
    pub max_provision_polls: u32,
    /// Run `az login` when no session is found and a terminal is attached
    pub interactive_login: bool,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Cli,
            az_binary: azure::AZ_BINARY.to_string(),
            management_endpoint: azure::MANAGEMENT_ENDPOINT.to_string(),
            snapshot_api_version: azure::SNAPSHOT_API_VERSION.to_string(),
            vm_api_version: azure::VM_API_VERSION.to_string(),
            request_timeout_seconds: azure::REQUEST_TIMEOUT.as_secs(),
            provision_poll_interval_seconds: azure::PROVISION_POLL_INTERVAL.as_secs(),
            max_provision_polls: azure::MAX_PROVISION_POLLS,
            interactive_login: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub dry_run: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: batch::DEFAULT_CONCURRENCY,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            base_delay_ms: retry::BASE_DELAY_MS,
            multiplier: retry::MULTIPLIER,
            max_delay_ms: retry::MAX_DELAY_MS,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub name_prefix: String,
    pub expire_days: u32,
    pub incremental: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            name_prefix: snapshot::NAME_PREFIX.to_string(),
            expire_days: snapshot::EXPIRE_DAYS,
            incremental: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Snapshot list that `create` appends to
    pub snapshot_list_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(files::OUTPUT_DIR),
            snapshot_list_file: PathBuf::from(files::SNAP_RID_LIST),
        }
    }
}

/// Values given on the command line; `None` keeps the file/default value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend: Option<Backend>,
    pub concurrency: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub no_login: bool,
}

impl Config {
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(backend) = overrides.backend {
            self.azure.backend = backend;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.batch.concurrency = concurrency;
        }
        if let Some(dir) = &overrides.output_dir {
            self.output.dir = dir.clone();
        }
        if overrides.dry_run {
            self.batch.dry_run = true;
        }
        if overrides.no_login {
            self.azure.interactive_login = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.concurrency == 0 || self.batch.concurrency > batch::MAX_CONCURRENCY {
            return Err(ConfigError::InvalidValue {
                field: "batch.concurrency".to_string(),
                reason: format!("must be between 1 and {}", batch::MAX_CONCURRENCY),
            });
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > retry::MAX_ATTEMPTS_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                reason: format!("must be between 1 and {}", retry::MAX_ATTEMPTS_LIMIT),
            });
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.multiplier".to_string(),
                reason: "must be a number >= 1.0".to_string(),
            });
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_delay_ms".to_string(),
                reason: "must not be smaller than retry.base_delay_ms".to_string(),
            });
        }
        if self.snapshot.name_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "snapshot.name_prefix".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.azure.management_endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "azure.management_endpoint".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        for (field, value) in [
            ("azure.request_timeout_seconds", self.azure.request_timeout_seconds),
            ("azure.provision_poll_interval_seconds", self.azure.provision_poll_interval_seconds),
            ("azure.max_provision_polls", u64::from(self.azure.max_provision_polls)),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.azure.request_timeout_seconds)
    }

    pub fn provision_poll_interval(&self) -> Duration {
        Duration::from_secs(self.azure.provision_poll_interval_seconds)
    }
}
