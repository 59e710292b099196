// ABOUTME: Post-provisioning configuration of each deployed resource.
// ABOUTME: Stops at the first resource the backend cannot configure.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{BackendError, ProvisioningBackend};
use crate::deploy::context::DeploymentContext;
use crate::deploy::error::HandlerFault;

use super::{HandlerOutcome, StateHandler};

pub struct ConfigurationHandler {
    backend: Arc<dyn ProvisioningBackend>,
}

impl ConfigurationHandler {
    pub fn new(backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl StateHandler for ConfigurationHandler {
    async fn handle(&self, ctx: &mut DeploymentContext) -> Result<HandlerOutcome, HandlerFault> {
        let target = ctx.target();
        let deployed: Vec<_> = ctx
            .deployed_resources
            .iter()
            .filter(|r| !r.is_dry_run())
            .cloned()
            .collect();

        tracing::info!(
            deployment_id = %ctx.deployment_id,
            resource_count = deployed.len(),
            "Configuring resources"
        );

        for resource in &deployed {
            match self.backend.configure(resource, &target).await {
                Ok(()) => {}
                Err(BackendError::Rejected(message)) => {
                    let details = ctx.error_details_mut();
                    details.resource = Some(resource.name.clone());
                    details.error = Some(message.clone());
                    return Ok(HandlerOutcome::retryable(format!(
                        "failed to configure {}: {message}",
                        resource.name
                    )));
                }
                Err(fault) => return Err(HandlerFault::from_backend(fault, Some(&resource.name))),
            }
        }
        Ok(HandlerOutcome::Proceed)
    }
}
