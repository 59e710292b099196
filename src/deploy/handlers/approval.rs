// ABOUTME: Approval gate between validation and provisioning.
// ABOUTME: Dev, test and dry runs pass; other environments need an approval token.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::deploy::context::DeploymentContext;
use crate::deploy::error::HandlerFault;
use crate::types::ApprovalToken;

use super::{HandlerOutcome, StateHandler};

/// Two-phase gate: the first pass without a token mints one and fails
/// retryably; the retry sees the token and passes.
#[derive(Debug, Clone, Default)]
pub struct ApprovalHandler;

impl ApprovalHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StateHandler for ApprovalHandler {
    async fn handle(&self, ctx: &mut DeploymentContext) -> Result<HandlerOutcome, HandlerFault> {
        if ctx.environment.auto_approves() || ctx.dry_run {
            tracing::info!(
                deployment_id = %ctx.deployment_id,
                environment = %ctx.environment,
                dry_run = ctx.dry_run,
                "Deployment auto-approved"
            );
            return Ok(HandlerOutcome::Proceed);
        }

        if ctx.approval_token.as_ref().is_some_and(|t| !t.is_empty()) {
            tracing::info!(deployment_id = %ctx.deployment_id, "Deployment approved");
            return Ok(HandlerOutcome::Proceed);
        }

        let token = ApprovalToken::generate();
        tracing::info!(
            deployment_id = %ctx.deployment_id,
            token = %token,
            "Approval requested"
        );
        ctx.metadata.insert(
            "approval_requested_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        ctx.approval_token = Some(token);
        Ok(HandlerOutcome::retryable("awaiting approval"))
    }
}
