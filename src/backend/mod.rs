// ABOUTME: Provisioning backend boundary used by the state machine handlers.
// ABOUTME: Trait, target description, error type and a simulated implementation.

mod simulated;

pub use simulated::{BackendCall, Operation, SimulatedBackend, Trigger};

use async_trait::async_trait;

use crate::resource::{DeployedResource, ResourceSpec};
use crate::types::Environment;

/// Where resources are being deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub deployment_id: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
    pub environment: Environment,
}

impl DeploymentTarget {
    /// ARM-style resource id.
    pub fn resource_id(&self, resource_type: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            self.subscription_id, self.resource_group, resource_type, name
        )
    }
}

/// Post-deployment checks delegated to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationCheck {
    Connectivity,
    Configuration,
    Security,
}

impl VerificationCheck {
    pub const ALL: [VerificationCheck; 3] = [
        VerificationCheck::Connectivity,
        VerificationCheck::Configuration,
        VerificationCheck::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationCheck::Connectivity => "connectivity",
            VerificationCheck::Configuration => "configuration",
            VerificationCheck::Security => "security",
        }
    }
}

impl std::fmt::Display for VerificationCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The provider declined the request; retrying as-is may succeed.
    #[error("{0}")]
    Rejected(String),

    /// The provider raised an error worth analyzing.
    #[error("{code}: {message}")]
    Fault { code: String, message: String },
}

impl BackendError {
    pub fn rejected(message: impl Into<String>) -> Self {
        BackendError::Rejected(message.into())
    }

    pub fn fault(code: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Fault {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Cloud provisioning operations.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    async fn deploy(
        &self,
        resource: &ResourceSpec,
        target: &DeploymentTarget,
    ) -> Result<DeployedResource, BackendError>;

    async fn rollback(
        &self,
        resource: &DeployedResource,
        target: &DeploymentTarget,
    ) -> Result<(), BackendError>;

    /// Post-provisioning configuration of one resource.
    async fn configure(
        &self,
        _resource: &DeployedResource,
        _target: &DeploymentTarget,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn verify(
        &self,
        _check: VerificationCheck,
        _deployed: &[DeployedResource],
        _target: &DeploymentTarget,
    ) -> Result<(), BackendError> {
        Ok(())
    }
}
