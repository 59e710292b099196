// ABOUTME: Deployment lease preventing two drivers from running the same deployment.
// ABOUTME: Atomic create in the checkpoint store, holder info stored as JSON.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{CheckpointStore, keys};

use super::error::{DeployError, LeaseHolderInfo};

/// Information about who holds a deployment lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseInfo {
    /// Hostname of the machine that holds the lease.
    pub holder: String,
    /// Process ID of the lease holder.
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub deployment_id: String,
}

impl LeaseInfo {
    /// Lease info for the current process.
    pub fn new(deployment_id: &str) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            deployment_id: deployment_id.to_string(),
        }
    }

    /// Older than `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        let age = Utc::now() - self.started_at;
        age.to_std().is_ok_and(|age| age >= max_age)
    }

    fn holder_info(&self) -> LeaseHolderInfo {
        LeaseHolderInfo {
            holder: self.holder.clone(),
            pid: self.pid,
            started_at: self.started_at,
        }
    }
}

/// A held lease. Release it explicitly when the drive ends.
pub struct DeploymentLease {
    store: Arc<dyn CheckpointStore>,
    key: String,
    deployment_id: String,
    max_age: Duration,
}

impl std::fmt::Debug for DeploymentLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentLease")
            .field("key", &self.key)
            .finish()
    }
}

impl DeploymentLease {
    /// Acquire the lease for `deployment_id`.
    ///
    /// Fails with `DeployError::LeaseHeld` while another live lease exists.
    /// Stale or unreadable leases are broken with a warning.
    pub async fn acquire(
        store: Arc<dyn CheckpointStore>,
        deployment_id: &str,
        max_age: Duration,
    ) -> Result<Self, DeployError> {
        let key = keys::lease(deployment_id);
        let info = LeaseInfo::new(deployment_id);
        let json = serde_json::to_string(&info).map_err(DeployError::codec("lease"))?;

        let lease = |store: Arc<dyn CheckpointStore>| Self {
            store,
            key: key.clone(),
            deployment_id: deployment_id.to_string(),
            max_age,
        };

        if store.put_if_absent(&key, &json, max_age).await? {
            return Ok(lease(store));
        }

        if !Self::should_break(store.as_ref(), &key, max_age).await? {
            return match Self::holder(store.as_ref(), &key).await {
                Some(existing) => Err(DeployError::LeaseHeld(existing.holder_info())),
                None => Err(DeployError::Lease(
                    "lease held by another driver".to_string(),
                )),
            };
        }

        tracing::debug!(key = %key, "Removing stale lease");
        store.delete(&key).await?;

        if !store.put_if_absent(&key, &json, max_age).await? {
            return Err(DeployError::Lease(
                "lease acquired by another driver during break".to_string(),
            ));
        }
        Ok(lease(store))
    }

    async fn holder(store: &dyn CheckpointStore, key: &str) -> Option<LeaseInfo> {
        let raw = store.get(key).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    async fn should_break(
        store: &dyn CheckpointStore,
        key: &str,
        max_age: Duration,
    ) -> Result<bool, DeployError> {
        let Some(raw) = store.get(key).await? else {
            // Expired between the create attempt and this read.
            return Ok(true);
        };

        match serde_json::from_str::<LeaseInfo>(&raw) {
            Ok(existing) if existing.is_stale(max_age) => {
                tracing::warn!(
                    "Auto-breaking stale lease held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(_) => {
                tracing::warn!("Lease info corrupted, breaking lease");
                Ok(true)
            }
        }
    }

    /// Restamp the lease so it stays live while the drive makes progress.
    pub async fn renew(&self) -> Result<(), DeployError> {
        let info = LeaseInfo::new(&self.deployment_id);
        let json = serde_json::to_string(&info).map_err(DeployError::codec("lease"))?;
        self.store.put(&self.key, &json, self.max_age).await?;
        Ok(())
    }

    /// Release the lease.
    pub async fn release(self) -> Result<(), DeployError> {
        self.store.delete(&self.key).await?;
        Ok(())
    }
}
