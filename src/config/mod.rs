// ABOUTME: Configuration types and parsing for skyplan.yml.
// ABOUTME: Orchestrator tunables, checkpoint store selection and quotas, all defaulted.

mod env_value;
mod init;
mod manifest;

pub use env_value::EnvValue;
pub use init::init_config;
pub use manifest::DeploymentManifest;

use crate::deploy::MachineSettings;
use crate::error::{Error, Result};
use crate::store::{CheckpointStore, DEFAULT_TTL, FileStore, MemoryStore};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "skyplan.yml";
pub const CONFIG_FILENAME_ALT: &str = "skyplan.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".skyplan/config.yml";

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub store: StoreConfig,
    pub quotas: QuotaConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_retries: u32,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    pub parallelism: usize,

    pub rollback_enabled: bool,

    /// Leases older than this are broken. Unset means the deployment timeout.
    #[serde(with = "humantime_serde")]
    pub lease_max_age: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(60 * 60),
            backoff_base: Duration::from_secs(1),
            parallelism: 4,
            rollback_enabled: true,
            lease_max_age: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// State directory for the file store, relative to the project dir.
    pub path: PathBuf,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::File,
            path: PathBuf::from(".skyplan/state"),
            ttl: DEFAULT_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub vm_cores: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { vm_cores: 100 }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading configuration");
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Like `discover`, but a missing file means defaults.
    pub fn discover_or_default(dir: &Path) -> Result<Self> {
        match Self::discover(dir) {
            Err(Error::ConfigNotFound(_)) => {
                tracing::debug!(dir = %dir.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.orchestrator.parallelism == 0 {
            return Err(Error::InvalidConfig(
                "orchestrator.parallelism must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "orchestrator.timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Deployment timeout in whole minutes, rounded up.
    pub fn timeout_minutes(&self) -> u64 {
        self.orchestrator.timeout.as_secs().div_ceil(60)
    }

    pub fn machine_settings(&self) -> MachineSettings {
        MachineSettings {
            backoff_base: self.orchestrator.backoff_base,
            parallelism: self.orchestrator.parallelism,
            vm_core_quota: self.quotas.vm_cores,
            store_ttl: self.store.ttl,
            lease_max_age: self.orchestrator.lease_max_age,
        }
    }

    /// Open the configured checkpoint store. Relative store paths resolve
    /// against `project_dir`.
    pub async fn open_store(&self, project_dir: &Path) -> Result<Arc<dyn CheckpointStore>> {
        match self.store.kind {
            StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreKind::File => {
                let dir = if self.store.path.is_absolute() {
                    self.store.path.clone()
                } else {
                    project_dir.join(&self.store.path)
                };
                Ok(Arc::new(FileStore::open(dir).await?))
            }
        }
    }
}
