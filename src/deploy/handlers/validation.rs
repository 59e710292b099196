// ABOUTME: Pre-deployment validation battery run in the validating state.
// ABOUTME: Ordered checks, the first failure stops the deployment without retry.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::analyzer::normalize_type;
use crate::deploy::context::{CheckResult, DeploymentContext};
use crate::deploy::error::HandlerFault;
use crate::resource::ResourceSpec;
use crate::types::Environment;

use super::{HandlerOutcome, StateHandler};

const MAX_RESOURCE_GROUP_LEN: usize = 90;
const DEFAULT_VM_CORES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCheck {
    Subscription,
    ResourceGroup,
    Resources,
    Dependencies,
    Quotas,
    Permissions,
}

impl ValidationCheck {
    /// Execution order.
    pub const ALL: [ValidationCheck; 6] = [
        ValidationCheck::Subscription,
        ValidationCheck::ResourceGroup,
        ValidationCheck::Resources,
        ValidationCheck::Dependencies,
        ValidationCheck::Quotas,
        ValidationCheck::Permissions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCheck::Subscription => "subscription",
            ValidationCheck::ResourceGroup => "resource_group",
            ValidationCheck::Resources => "resources",
            ValidationCheck::Dependencies => "dependencies",
            ValidationCheck::Quotas => "quotas",
            ValidationCheck::Permissions => "permissions",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationHandler {
    vm_core_quota: u32,
}

impl ValidationHandler {
    pub fn new(vm_core_quota: u32) -> Self {
        Self { vm_core_quota }
    }

    fn run(&self, check: ValidationCheck, ctx: &DeploymentContext) -> CheckResult {
        match check {
            ValidationCheck::Subscription => check_subscription(ctx),
            ValidationCheck::ResourceGroup => check_resource_group(&ctx.resource_group),
            ValidationCheck::Resources => check_resources(&ctx.resources),
            ValidationCheck::Dependencies => check_dependencies(&ctx.resources),
            ValidationCheck::Quotas => self.check_quotas(&ctx.resources),
            ValidationCheck::Permissions => check_permissions(ctx),
        }
    }

    fn check_quotas(&self, resources: &[ResourceSpec]) -> CheckResult {
        let requested: u32 = resources
            .iter()
            .filter(|r| is_virtual_machine(&r.resource_type))
            .map(estimated_cores)
            .sum();
        if requested > self.vm_core_quota {
            return CheckResult::fail(format!(
                "requested {requested} VM cores, quota is {}",
                self.vm_core_quota
            ));
        }
        CheckResult::pass()
    }
}

#[async_trait]
impl StateHandler for ValidationHandler {
    async fn handle(&self, ctx: &mut DeploymentContext) -> Result<HandlerOutcome, HandlerFault> {
        tracing::info!(
            deployment_id = %ctx.deployment_id,
            resource_count = ctx.resources.len(),
            "Validating deployment"
        );

        for check in ValidationCheck::ALL {
            let result = self.run(check, ctx);
            let passed = result.valid;
            let message = result.message.clone();
            ctx.validation_results
                .checks
                .insert(check.as_str().to_string(), result);

            if !passed {
                let message = message.unwrap_or_default();
                tracing::warn!(
                    deployment_id = %ctx.deployment_id,
                    check = check.as_str(),
                    %message,
                    "Validation failed"
                );
                ctx.validation_results.valid = Some(false);
                let details = ctx.error_details_mut();
                details.validation_failed = Some(check.as_str().to_string());
                details.error = Some(message.clone());
                return Ok(HandlerOutcome::fatal(format!(
                    "validation failed: {}: {message}",
                    check.as_str()
                )));
            }
        }

        ctx.validation_results.valid = Some(true);
        Ok(HandlerOutcome::Proceed)
    }
}

fn check_subscription(ctx: &DeploymentContext) -> CheckResult {
    if ctx.subscription_id.trim().is_empty() {
        return CheckResult::fail("subscription id is required");
    }
    CheckResult::pass()
}

fn check_resource_group(name: &str) -> CheckResult {
    if name.is_empty() {
        return CheckResult::fail("resource group is required");
    }
    if name.chars().count() > MAX_RESOURCE_GROUP_LEN {
        return CheckResult::fail(format!(
            "resource group name exceeds {MAX_RESOURCE_GROUP_LEN} characters"
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '(' | ')')))
    {
        return CheckResult::fail(format!("resource group name contains '{bad}'"));
    }
    if name.ends_with('.') {
        return CheckResult::fail("resource group name cannot end with '.'");
    }
    CheckResult::pass()
}

fn check_resources(resources: &[ResourceSpec]) -> CheckResult {
    if resources.is_empty() {
        return CheckResult::fail("no resources to deploy");
    }
    let mut seen = HashSet::new();
    for (index, resource) in resources.iter().enumerate() {
        if resource.name.trim().is_empty() {
            return CheckResult::fail(format!("resource at position {index} has no name"));
        }
        if resource.resource_type.trim().is_empty() {
            return CheckResult::fail(format!("resource '{}' has no type", resource.name));
        }
        if !seen.insert(resource.name.as_str()) {
            return CheckResult::fail(format!("duplicate resource name '{}'", resource.name));
        }
    }
    CheckResult::pass()
}

/// Explicit `depends_on` edges must not form a cycle. References to names
/// outside the deployment are ignored here.
fn check_dependencies(resources: &[ResourceSpec]) -> CheckResult {
    let mut graph = DiGraph::<&str, ()>::new();
    let nodes: HashMap<&str, _> = resources
        .iter()
        .map(|r| (r.name.as_str(), graph.add_node(r.name.as_str())))
        .collect();

    for resource in resources {
        let from = nodes[resource.name.as_str()];
        for dep in &resource.depends_on {
            if let Some(&to) = nodes.get(dep.as_str()) {
                graph.add_edge(from, to, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_) => CheckResult::pass(),
        Err(cycle) => CheckResult::fail(format!(
            "circular dependency involving '{}'",
            graph[cycle.node_id()]
        )),
    }
}

fn check_permissions(ctx: &DeploymentContext) -> CheckResult {
    if ctx.environment == Environment::Prod
        && !ctx.roles.iter().any(|r| r.eq_ignore_ascii_case("admin"))
    {
        return CheckResult::fail("prod deployments require the admin role");
    }
    CheckResult::pass()
}

fn is_virtual_machine(resource_type: &str) -> bool {
    matches!(
        normalize_type(resource_type).as_str(),
        "virtual_machine" | "vm"
    )
}

/// Cores a VM resource will consume: the `cores` attribute, else the number
/// in its size name (`Standard_D4s_v3` is 4), else 2.
pub fn estimated_cores(resource: &ResourceSpec) -> u32 {
    if let Some(cores) = resource.attributes.get("cores") {
        let parsed = cores
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .or_else(|| cores.as_str().and_then(|s| s.trim().parse().ok()));
        if let Some(cores) = parsed {
            return cores;
        }
    }

    ["vm_size", "sku"]
        .iter()
        .filter_map(|key| resource.attribute(key))
        .find_map(cores_from_size)
        .unwrap_or(DEFAULT_VM_CORES)
}

fn cores_from_size(size: &str) -> Option<u32> {
    let family = size.split('_').nth(1)?;
    let digits: String = family
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
