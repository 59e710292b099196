// ABOUTME: Deploy and resume command implementations.
// ABOUTME: Seeds a context from a manifest, plans it, and drives the state machine.

use super::status::render_context;
use super::{deploy_error, state_machine};
use skyplan::analyzer::DependencyAnalyzer;
use skyplan::config::{Config, DeploymentManifest};
use skyplan::deploy::{DeploymentContext, DeploymentState};
use skyplan::error::{Error, Result};
use skyplan::output::Output;
use std::path::Path;

/// Deploy a manifest. Fails unless the deployment completes.
pub async fn deploy(manifest_path: &Path, project_dir: &Path, mut output: Output) -> Result<()> {
    output.start_timer();
    let config = Config::discover_or_default(project_dir)?;
    let mut ctx = DeploymentManifest::load(manifest_path)?.into_context(&config)?;

    let plan = DependencyAnalyzer::new().analyze(&ctx.resources, ctx.environment)?;
    for warning in &plan.dependency_warnings {
        output.warning(warning);
    }
    output.progress(&format!(
        "Deploying {} resource(s) in {} group(s) to {}/{} [{}]",
        plan.resource_count(),
        plan.deployment_groups.len(),
        ctx.subscription_id,
        ctx.resource_group,
        ctx.deployment_id
    ));
    ctx.plan = Some(plan);

    let machine = state_machine(&config, project_dir).await?;
    let ctx = machine.execute(ctx).await.map_err(deploy_error)?;
    finish(&output, &ctx)
}

pub async fn resume(deployment_id: &str, project_dir: &Path, mut output: Output) -> Result<()> {
    output.start_timer();
    let config = Config::discover_or_default(project_dir)?;
    let machine = state_machine(&config, project_dir).await?;

    output.progress(&format!("Resuming {deployment_id}"));
    let ctx = machine.resume(deployment_id).await.map_err(deploy_error)?;
    finish(&output, &ctx)
}

fn finish(output: &Output, ctx: &DeploymentContext) -> Result<()> {
    output.document(ctx, || render_context(ctx));

    if ctx.state != DeploymentState::Completed {
        return Err(Error::DeploymentFailed {
            deployment_id: ctx.deployment_id.to_string(),
            state: ctx.state,
        });
    }
    output.success(&format!("Deployment {} completed", ctx.deployment_id));
    Ok(())
}
