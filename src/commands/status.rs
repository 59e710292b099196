// ABOUTME: Status and cancel command implementations.
// ABOUTME: Read or flag persisted deployments in the configured checkpoint store.

use super::{deploy_error, state_machine};
use skyplan::config::Config;
use skyplan::deploy::DeploymentContext;
use skyplan::error::{Error, Result};
use skyplan::output::Output;
use std::fmt::Write;
use std::path::Path;

pub async fn status(deployment_id: &str, project_dir: &Path, output: Output) -> Result<()> {
    let config = Config::discover_or_default(project_dir)?;
    let machine = state_machine(&config, project_dir).await?;

    let ctx = machine
        .get_status(deployment_id)
        .await
        .map_err(deploy_error)?
        .ok_or_else(|| Error::UnknownDeployment(deployment_id.to_string()))?;

    output.document(&ctx, || render_context(&ctx));
    Ok(())
}

pub async fn cancel(deployment_id: &str, project_dir: &Path, output: Output) -> Result<()> {
    let config = Config::discover_or_default(project_dir)?;
    let machine = state_machine(&config, project_dir).await?;

    machine
        .request_cancel(deployment_id)
        .await
        .map_err(deploy_error)?;
    output.success(&format!("Cancellation requested for {deployment_id}"));
    Ok(())
}

pub(crate) fn render_context(ctx: &DeploymentContext) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Deployment: {}", ctx.deployment_id);
    let _ = writeln!(text, "State: {}", ctx.state);
    let _ = writeln!(
        text,
        "Target: {}/{} ({}, {})",
        ctx.subscription_id, ctx.resource_group, ctx.location, ctx.environment
    );
    let _ = writeln!(
        text,
        "Resources: {} deployed of {}",
        ctx.deployed_resources.len(),
        ctx.resources.len()
    );
    if ctx.retry_count > 0 {
        let _ = writeln!(text, "Retries: {}/{}", ctx.retry_count, ctx.max_retries);
    }
    let path: Vec<&str> = ctx
        .state_history
        .iter()
        .map(|entry| entry.state.as_str())
        .chain(std::iter::once(ctx.state.as_str()))
        .collect();
    let _ = writeln!(text, "History: {}", path.join(" -> "));

    if let Some(details) = &ctx.error_details {
        if let Some(reason) = &details.reason {
            let _ = writeln!(text, "Reason: {reason}");
        }
        if let Some(resource) = &details.resource {
            let _ = writeln!(text, "Failing resource: {resource}");
        }
        if let Some(remediation) = &details.remediation {
            let _ = writeln!(
                text,
                "Suggested action: {} (success probability {:.0}%)",
                remediation.primary_action,
                remediation.estimated_success_probability * 100.0
            );
        }
        for failure in &details.rollback_failures {
            let _ = writeln!(
                text,
                "Rollback failed for {}: {}",
                failure.resource, failure.error
            );
        }
    }
    text
}
