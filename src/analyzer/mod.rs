// ABOUTME: Dependency analyzer turning a flat resource list into a deployment plan.
// ABOUTME: Infers implicit dependencies, groups resources, finds the critical path.

mod graph;
mod plan;
mod templates;

pub use plan::{
    DeploymentPlan, OptimizationReport, ResourceDependency, count_parallel_opportunities,
    estimate_total_time,
};
pub use templates::{ResourceTemplate, TemplateTable, normalize_type};

use std::collections::HashSet;

use crate::diagnostics::{Diagnostics, Warning};
use crate::resource::ResourceSpec;
use crate::types::Environment;

/// Input the analyzer refuses to plan.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("resource at position {index} has no name")]
    MissingName { index: usize },

    #[error("duplicate resource name: {0}")]
    DuplicateName(String),
}

/// Builds deployment plans. Construct once and share; the template table is
/// read-only after construction.
#[derive(Debug, Clone)]
pub struct DependencyAnalyzer {
    templates: TemplateTable,
}

impl Default for DependencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyAnalyzer {
    pub fn new() -> Self {
        Self {
            templates: TemplateTable::builtin(),
        }
    }

    /// Analyze the resources of one deployment.
    ///
    /// # Errors
    ///
    /// Returns `AnalyzerError` for unnamed or duplicated resources. Cycles and
    /// dangling references are never errors; they surface as warnings.
    pub fn analyze(
        &self,
        resources: &[ResourceSpec],
        environment: Environment,
    ) -> Result<DeploymentPlan, AnalyzerError> {
        tracing::info!(
            resource_count = resources.len(),
            environment = %environment,
            "Starting dependency analysis"
        );

        check_names(resources)?;

        let mut diag = Diagnostics::default();
        let mut deps = self.build_dependency_graph(resources);
        validate_dependencies(&deps, &mut diag);

        let groups = graph::calculate_groups(&mut deps, &mut diag);
        let (critical_time, critical_path) = graph::critical_path(&deps);
        let total = estimate_total_time(&groups);
        let parallel = count_parallel_opportunities(&groups);

        tracing::info!(
            deployment_groups = groups.len(),
            estimated_time_seconds = total,
            critical_path_seconds = critical_time,
            parallel_opportunities = parallel,
            warnings_count = diag.warnings().len(),
            "Dependency analysis completed"
        );

        Ok(DeploymentPlan {
            deployment_groups: groups,
            total_estimated_time_seconds: total,
            parallel_opportunities: parallel,
            critical_path,
            dependency_warnings: diag.into_messages(),
        })
    }

    /// Split groups that mix parallel-safe and sequential-only resources:
    /// the parallel-safe members stay together, each sequential-only member
    /// gets its own group right after them.
    ///
    /// Applying this to an already optimized plan changes nothing.
    pub fn optimize_for_parallel(
        &self,
        plan: &DeploymentPlan,
    ) -> (DeploymentPlan, OptimizationReport) {
        let original = plan.total_estimated_time_seconds;
        let mut groups: Vec<Vec<ResourceDependency>> = Vec::new();

        for group in &plan.deployment_groups {
            let (parallel_safe, sequential_only): (Vec<_>, Vec<_>) = group
                .iter()
                .cloned()
                .partition(|r| r.can_deploy_parallel);

            if group.len() <= 1 || parallel_safe.is_empty() || sequential_only.is_empty() {
                groups.push(group.clone());
                continue;
            }

            groups.push(parallel_safe);
            groups.extend(sequential_only.into_iter().map(|r| vec![r]));
        }

        for (index, group) in groups.iter_mut().enumerate() {
            for resource in group {
                resource.deployment_group = index;
            }
        }

        let optimized = estimate_total_time(&groups);
        let parallel = count_parallel_opportunities(&groups);
        let saved = original as i64 - optimized as i64;

        tracing::info!(
            time_saved_seconds = saved,
            parallel_opportunities = parallel,
            optimization_effective = saved > 0,
            "Parallel deployment optimization completed"
        );

        let report = OptimizationReport {
            original_time_seconds: original,
            optimized_time_seconds: optimized,
            time_saved_seconds: saved,
            parallel_operations: parallel,
            optimization_applied: saved > 0,
        };

        let optimized_plan = DeploymentPlan {
            deployment_groups: groups,
            total_estimated_time_seconds: optimized,
            parallel_opportunities: parallel,
            critical_path: plan.critical_path.clone(),
            dependency_warnings: plan.dependency_warnings.clone(),
        };

        (optimized_plan, report)
    }

    fn build_dependency_graph(&self, resources: &[ResourceSpec]) -> Vec<ResourceDependency> {
        let siblings: Vec<Sibling<'_>> = resources
            .iter()
            .map(|r| Sibling {
                name: r.name.as_str(),
                resource_type: normalize_type(&r.resource_type),
            })
            .collect();

        resources
            .iter()
            .zip(&siblings)
            .map(|(resource, me)| {
                let template = self.templates.get(&me.resource_type);
                let inferred = infer_dependencies(resource, &me.resource_type, &siblings);

                let mut depends_on: Vec<String> = Vec::new();
                for dep in resource.depends_on.iter().chain(&inferred) {
                    if !depends_on.contains(dep) {
                        depends_on.push(dep.clone());
                    }
                }

                let mut provides: Vec<String> =
                    template.provides.iter().map(|p| p.to_string()).collect();
                for p in &resource.provides {
                    if !provides.contains(p) {
                        provides.push(p.clone());
                    }
                }

                tracing::debug!(
                    resource = %resource.name,
                    resource_type = %me.resource_type,
                    dependencies = depends_on.len(),
                    inferred = inferred.len(),
                    "Resource dependency built"
                );

                ResourceDependency {
                    resource_name: resource.name.clone(),
                    resource_type: me.resource_type.clone(),
                    depends_on,
                    provides,
                    deployment_group: 0,
                    can_deploy_parallel: template.parallel_safe,
                    estimated_deploy_time_seconds: template.deploy_time_seconds,
                }
            })
            .collect()
    }
}

struct Sibling<'a> {
    name: &'a str,
    resource_type: String,
}

fn check_names(resources: &[ResourceSpec]) -> Result<(), AnalyzerError> {
    let mut seen = HashSet::with_capacity(resources.len());
    for (index, resource) in resources.iter().enumerate() {
        if resource.name.trim().is_empty() {
            return Err(AnalyzerError::MissingName { index });
        }
        if !seen.insert(resource.name.as_str()) {
            return Err(AnalyzerError::DuplicateName(resource.name.clone()));
        }
    }
    Ok(())
}

/// Type-specific heuristics for dependencies the caller did not spell out.
fn infer_dependencies(
    resource: &ResourceSpec,
    resource_type: &str,
    siblings: &[Sibling<'_>],
) -> Vec<String> {
    let first_of = |wanted: &str| {
        siblings
            .iter()
            .find(|s| s.resource_type == wanted)
            .map(|s| s.name.to_string())
    };
    let named = |attribute: &str| {
        resource
            .attribute(attribute)
            .filter(|name| siblings.iter().any(|s| s.name == *name))
            .map(str::to_string)
    };

    match resource_type {
        "webapp" => {
            let conventional = format!("{}-plan", resource.name);
            if siblings.iter().any(|s| s.name == conventional) {
                vec![conventional]
            } else {
                first_of("app_service_plan").into_iter().collect()
            }
        }
        "aks_cluster" => first_of("vnet")
            .into_iter()
            .chain(first_of("log_analytics_workspace"))
            .collect(),
        "subnet" => named("vnet_name").into_iter().collect(),
        "sql_database" => named("server_name").into_iter().collect(),
        _ => Vec::new(),
    }
}

fn validate_dependencies(deps: &[ResourceDependency], diag: &mut Diagnostics) {
    let names: HashSet<&str> = deps.iter().map(|d| d.resource_name.as_str()).collect();
    let has_workspace = deps
        .iter()
        .any(|d| d.resource_type == "log_analytics_workspace");

    for resource in deps {
        for dep in &resource.depends_on {
            if !names.contains(dep.as_str()) {
                diag.warn(Warning::missing_dependency(&resource.resource_name, dep));
            }
        }
        if resource.resource_type == "aks_cluster" && !has_workspace {
            diag.warn(Warning::missing_monitoring(&resource.resource_name));
        }
    }
}
