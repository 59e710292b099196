// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates skyplan.yml template files.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

const TEMPLATE: &str = r#"orchestrator:
  max_retries: 3
  timeout: 60m
  backoff_base: 1s
  # Concurrent deploys within a dependency group (1 = sequential)
  parallelism: 4
  rollback_enabled: true
  # Leases not renewed within this are broken (default: the timeout plus 5m)
  # lease_max_age: 2h

store:
  # file or memory
  kind: file
  path: .skyplan/state
  ttl: 24h

quotas:
  vm_cores: 100
"#;

/// Write a commented `skyplan.yml` holding the defaults into `dir`.
pub fn init_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;
    Ok(config_path)
}
