// ABOUTME: Post-deployment verification: local resource state, then backend checks.
// ABOUTME: Sets verified and names the first failing check.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{BackendError, ProvisioningBackend, VerificationCheck};
use crate::deploy::context::{CheckResult, DeploymentContext};
use crate::deploy::error::HandlerFault;

use super::{HandlerOutcome, StateHandler};

const RESOURCE_STATE: &str = "resource_state";

pub struct VerificationHandler {
    backend: Arc<dyn ProvisioningBackend>,
}

impl VerificationHandler {
    pub fn new(backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self { backend }
    }
}

fn mark_failed(ctx: &mut DeploymentContext, check: &str, message: &str) {
    tracing::warn!(
        deployment_id = %ctx.deployment_id,
        check,
        message,
        "Verification failed"
    );
    ctx.validation_results.verified = Some(false);
    ctx.validation_results
        .checks
        .insert(check.to_string(), CheckResult::fail(message));
    let details = ctx.error_details_mut();
    details.verification_failed = Some(check.to_string());
    details.error = Some(message.to_string());
}

#[async_trait]
impl StateHandler for VerificationHandler {
    async fn handle(&self, ctx: &mut DeploymentContext) -> Result<HandlerOutcome, HandlerFault> {
        tracing::info!(deployment_id = %ctx.deployment_id, "Verifying deployment");

        let missing: Vec<String> = ctx
            .deployed_resources
            .iter()
            .filter(|r| r.id.is_none() && !r.is_dry_run())
            .map(|r| r.name.clone())
            .collect();
        if !missing.is_empty() {
            let message = format!("resources without id: {}", missing.join(", "));
            mark_failed(ctx, RESOURCE_STATE, &message);
            return Ok(HandlerOutcome::fatal(format!(
                "verification failed: {RESOURCE_STATE}"
            )));
        }
        ctx.validation_results
            .checks
            .insert(RESOURCE_STATE.to_string(), CheckResult::pass());

        if !ctx.dry_run {
            let target = ctx.target();
            for check in VerificationCheck::ALL {
                let result = self
                    .backend
                    .verify(check, &ctx.deployed_resources, &target)
                    .await;
                match result {
                    Ok(()) => {
                        ctx.validation_results
                            .checks
                            .insert(check.as_str().to_string(), CheckResult::pass());
                    }
                    Err(BackendError::Rejected(message)) => {
                        mark_failed(ctx, check.as_str(), &message);
                        return Ok(HandlerOutcome::retryable(format!(
                            "verification failed: {check}"
                        )));
                    }
                    Err(fault) => {
                        mark_failed(ctx, check.as_str(), &fault.to_string());
                        return Err(HandlerFault::from_backend(fault, None));
                    }
                }
            }
        }

        ctx.validation_results.verified = Some(true);
        tracing::info!(deployment_id = %ctx.deployment_id, "Verification passed");
        Ok(HandlerOutcome::Proceed)
    }
}
