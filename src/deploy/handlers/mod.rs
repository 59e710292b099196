// ABOUTME: Per-state handlers the state machine runs right after entering a state.
// ABOUTME: Each returns a controlled outcome, or a fault routed to the error handler.

mod approval;
mod configuration;
mod provisioning;
mod rollback;
mod validation;
mod verification;

pub use approval::ApprovalHandler;
pub use configuration::ConfigurationHandler;
pub use provisioning::ProvisioningHandler;
pub use rollback::RollbackHandler;
pub use validation::{ValidationCheck, ValidationHandler, estimated_cores};
pub use verification::VerificationHandler;

use async_trait::async_trait;

use super::context::DeploymentContext;
use super::error::HandlerFault;

/// Controlled result of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Proceed,
    /// The state did not succeed. Retryable failures are retried with
    /// backoff while the retry budget lasts.
    Failed { reason: String, retryable: bool },
}

impl HandlerOutcome {
    pub fn retryable(reason: impl Into<String>) -> Self {
        HandlerOutcome::Failed {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        HandlerOutcome::Failed {
            reason: reason.into(),
            retryable: false,
        }
    }
}

/// Work done for one deployment state.
#[async_trait]
pub trait StateHandler: Send + Sync {
    async fn handle(&self, ctx: &mut DeploymentContext) -> Result<HandlerOutcome, HandlerFault>;
}
