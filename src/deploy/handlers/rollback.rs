// ABOUTME: Rollback handler removing deployed resources in reverse order.
// ABOUTME: Failures are recorded and never stop the rollback.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::ProvisioningBackend;
use crate::deploy::context::{DeploymentContext, RollbackFailure};
use crate::deploy::error::HandlerFault;

use super::{HandlerOutcome, StateHandler};

pub struct RollbackHandler {
    backend: Arc<dyn ProvisioningBackend>,
}

impl RollbackHandler {
    pub fn new(backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl StateHandler for RollbackHandler {
    async fn handle(&self, ctx: &mut DeploymentContext) -> Result<HandlerOutcome, HandlerFault> {
        let target = ctx.target();
        let to_remove: Vec<_> = ctx
            .deployed_resources
            .iter()
            .rev()
            .filter(|r| !r.is_dry_run())
            .cloned()
            .collect();

        tracing::info!(
            deployment_id = %ctx.deployment_id,
            resource_count = to_remove.len(),
            "Rolling back deployment"
        );

        let mut failures = Vec::new();
        for resource in &to_remove {
            if let Err(e) = self.backend.rollback(resource, &target).await {
                tracing::warn!(resource = %resource.name, error = %e, "Rollback of resource failed");
                failures.push(RollbackFailure {
                    resource: resource.name.clone(),
                    error: e.to_string(),
                });
            }
        }

        if !failures.is_empty() {
            ctx.error_details_mut().rollback_failures.extend(failures);
        }
        Ok(HandlerOutcome::Proceed)
    }
}
