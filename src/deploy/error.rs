// ABOUTME: Error types for driving deployments and for state handler faults.
// ABOUTME: DeployError aborts a drive; HandlerFault is routed through the error handler.

use chrono::{DateTime, Utc};

use crate::backend::BackendError;
use crate::remediation::ObservedError;
use crate::store::StoreError;

/// Errors that stop the state machine from driving a deployment at all.
///
/// Deployment failures are not errors: they end in a `Failed` or
/// `RolledBack` context returned as `Ok`.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another driver holds the deployment lease.
    #[error(
        "deployment lease held by {} (pid {}) since {}",
        .0.holder, .0.pid, .0.started_at
    )]
    LeaseHeld(LeaseHolderInfo),

    /// Lease could not be acquired or released.
    #[error("lease error: {0}")]
    Lease(String),

    /// No persisted context for this deployment.
    #[error("unknown deployment: {0}")]
    NotFound(String),

    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to encode or decode {what}: {source}")]
    Codec {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Who holds a deployment lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseHolderInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    LeaseHeld,
    Lease,
    NotFound,
    Store,
    Codec,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::LeaseHeld(_) => DeployErrorKind::LeaseHeld,
            DeployError::Lease(_) => DeployErrorKind::Lease,
            DeployError::NotFound(_) => DeployErrorKind::NotFound,
            DeployError::Store(_) => DeployErrorKind::Store,
            DeployError::Codec { .. } => DeployErrorKind::Codec,
        }
    }

    /// Holder details when the lease is taken.
    pub fn lease_holder_info(&self) -> Option<&LeaseHolderInfo> {
        match self {
            DeployError::LeaseHeld(info) => Some(info),
            _ => None,
        }
    }

    pub(crate) fn codec(what: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| DeployError::Codec { what, source }
    }
}

/// Unexpected failure inside a state handler. Unlike a controlled
/// `HandlerOutcome::Failed`, a fault is analyzed and may be remediated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerFault {
    /// Resource being worked on when the fault happened.
    pub resource: Option<String>,
    pub code: Option<String>,
    pub message: String,
}

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            resource: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn for_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Wrap a backend error raised while working on `resource`.
    pub fn from_backend(error: BackendError, resource: Option<&str>) -> Self {
        let (code, message) = match error {
            BackendError::Fault { code, message } => (Some(code), message),
            BackendError::Rejected(message) => (None, message),
        };
        Self {
            resource: resource.map(str::to_string),
            code,
            message,
        }
    }

    pub fn observed(&self) -> ObservedError {
        ObservedError {
            code: self.code.clone(),
            message: self.message.clone(),
        }
    }
}
