// ABOUTME: Provisioning handler deploying resources through the backend.
// ABOUTME: Sequential dependency order, or plan groups with bounded concurrency.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::analyzer::DependencyAnalyzer;
use crate::backend::{BackendError, DeploymentTarget, ProvisioningBackend};
use crate::deploy::context::DeploymentContext;
use crate::deploy::error::HandlerFault;
use crate::resource::{DeployedResource, ResourceSpec};

use super::{HandlerOutcome, StateHandler};

pub struct ProvisioningHandler {
    backend: Arc<dyn ProvisioningBackend>,
    parallelism: usize,
    analyzer: DependencyAnalyzer,
}

impl ProvisioningHandler {
    pub fn new(backend: Arc<dyn ProvisioningBackend>, parallelism: usize) -> Self {
        Self {
            backend,
            parallelism,
            analyzer: DependencyAnalyzer::new(),
        }
    }

    async fn provision_sequential(
        &self,
        ctx: &mut DeploymentContext,
    ) -> Result<HandlerOutcome, HandlerFault> {
        let target = ctx.target();
        for name in dependency_order(&ctx.resources) {
            if ctx.is_deployed(&name) {
                continue;
            }
            let Some(spec) = ctx.resource(&name).cloned() else {
                continue;
            };
            match deploy_one(self.backend.as_ref(), &spec, &target, ctx.dry_run).await {
                Ok(deployed) => ctx.deployed_resources.push(deployed),
                Err(e) => return failure(ctx, &name, e),
            }
        }
        Ok(HandlerOutcome::Proceed)
    }

    async fn provision_grouped(
        &self,
        ctx: &mut DeploymentContext,
    ) -> Result<HandlerOutcome, HandlerFault> {
        let groups = self.groups(ctx)?;
        let target = ctx.target();

        for (index, group) in groups.iter().enumerate() {
            let pending: Vec<ResourceSpec> = group
                .iter()
                .filter(|name| !ctx.is_deployed(name))
                .filter_map(|name| ctx.resource(name).cloned())
                .collect();
            if pending.is_empty() {
                continue;
            }

            tracing::debug!(
                deployment_id = %ctx.deployment_id,
                group = index,
                size = pending.len(),
                "Provisioning group"
            );

            let dry_run = ctx.dry_run;
            let mut results: HashMap<String, Result<DeployedResource, BackendError>> =
                stream::iter(pending.iter().cloned().map(|spec| {
                    let backend = self.backend.clone();
                    let target = target.clone();
                    async move {
                        let result = deploy_one(backend.as_ref(), &spec, &target, dry_run).await;
                        (spec.name, result)
                    }
                }))
                .buffer_unordered(self.parallelism.max(1))
                .collect()
                .await;

            // Record every success before reporting a failure, so rollback
            // sees the whole group.
            let mut first_failure = None;
            for spec in &pending {
                match results.remove(&spec.name) {
                    Some(Ok(deployed)) => ctx.deployed_resources.push(deployed),
                    Some(Err(e)) if first_failure.is_none() => {
                        first_failure = Some((spec.name.clone(), e));
                    }
                    _ => {}
                }
            }
            if let Some((name, e)) = first_failure {
                return failure(ctx, &name, e);
            }
        }
        Ok(HandlerOutcome::Proceed)
    }

    /// Group names from the seeded plan, or a fresh analysis. Resources the
    /// plan does not know go last.
    fn groups(&self, ctx: &DeploymentContext) -> Result<Vec<Vec<String>>, HandlerFault> {
        let fresh;
        let plan = match &ctx.plan {
            Some(plan) => plan,
            None => {
                fresh = self
                    .analyzer
                    .analyze(&ctx.resources, ctx.environment)
                    .map_err(|e| HandlerFault::new(e.to_string()))?;
                &fresh
            }
        };

        let mut groups: Vec<Vec<String>> = plan
            .group_names()
            .into_iter()
            .map(|g| g.into_iter().map(str::to_string).collect())
            .collect();

        let planned: HashSet<&str> = groups.iter().flatten().map(String::as_str).collect();
        let leftover: Vec<String> = ctx
            .resources
            .iter()
            .filter(|r| !planned.contains(r.name.as_str()))
            .map(|r| r.name.clone())
            .collect();
        if !leftover.is_empty() {
            groups.push(leftover);
        }
        Ok(groups)
    }
}

#[async_trait]
impl StateHandler for ProvisioningHandler {
    async fn handle(&self, ctx: &mut DeploymentContext) -> Result<HandlerOutcome, HandlerFault> {
        tracing::info!(
            deployment_id = %ctx.deployment_id,
            resource_count = ctx.resources.len(),
            already_deployed = ctx.deployed_resources.len(),
            parallelism = self.parallelism,
            dry_run = ctx.dry_run,
            "Provisioning resources"
        );

        let outcome = if self.parallelism <= 1 {
            self.provision_sequential(ctx).await?
        } else {
            self.provision_grouped(ctx).await?
        };

        if outcome == HandlerOutcome::Proceed {
            tracing::info!(
                deployment_id = %ctx.deployment_id,
                deployed = ctx.deployed_resources.len(),
                "Provisioning completed"
            );
        }
        Ok(outcome)
    }
}

async fn deploy_one(
    backend: &dyn ProvisioningBackend,
    spec: &ResourceSpec,
    target: &DeploymentTarget,
    dry_run: bool,
) -> Result<DeployedResource, BackendError> {
    if dry_run {
        tracing::info!(resource = %spec.name, "Dry run, skipping backend");
        return Ok(DeployedResource::dry_run(spec));
    }
    tracing::info!(resource = %spec.name, resource_type = %spec.resource_type, "Deploying resource");
    backend.deploy(spec, target).await
}

fn failure(
    ctx: &mut DeploymentContext,
    name: &str,
    error: BackendError,
) -> Result<HandlerOutcome, HandlerFault> {
    match error {
        BackendError::Rejected(message) => {
            tracing::warn!(resource = name, %message, "Resource deployment rejected");
            let details = ctx.error_details_mut();
            details.resource = Some(name.to_string());
            details.error = Some(message.clone());
            Ok(HandlerOutcome::retryable(format!(
                "failed to deploy {name}: {message}"
            )))
        }
        fault @ BackendError::Fault { .. } => Err(HandlerFault::from_backend(fault, Some(name))),
    }
}

/// Depth-first post-order over `depends_on`. Names outside the deployment
/// are skipped and each resource appears once, even inside a cycle.
fn dependency_order(resources: &[ResourceSpec]) -> Vec<String> {
    fn visit<'a>(
        name: &'a str,
        by_name: &HashMap<&'a str, &'a ResourceSpec>,
        visited: &mut HashSet<&'a str>,
        order: &mut Vec<String>,
    ) {
        let Some(&spec) = by_name.get(name) else {
            return;
        };
        if !visited.insert(name) {
            return;
        }
        for dep in &spec.depends_on {
            visit(dep, by_name, visited, order);
        }
        order.push(name.to_string());
    }

    let by_name: HashMap<&str, &ResourceSpec> =
        resources.iter().map(|r| (r.name.as_str(), r)).collect();
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(resources.len());
    for resource in resources {
        visit(&resource.name, &by_name, &mut visited, &mut order);
    }
    order
}
