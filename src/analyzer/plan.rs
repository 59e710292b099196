// ABOUTME: Deployment plan types produced by the dependency analyzer.
// ABOUTME: Groups of resource summaries, critical path, time estimates and warnings.

use serde::{Deserialize, Serialize};

/// One resource as seen by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDependency {
    pub resource_name: String,
    pub resource_type: String,
    pub depends_on: Vec<String>,
    pub provides: Vec<String>,
    pub deployment_group: usize,
    pub can_deploy_parallel: bool,
    pub estimated_deploy_time_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub deployment_groups: Vec<Vec<ResourceDependency>>,
    pub total_estimated_time_seconds: u64,
    pub parallel_opportunities: usize,
    pub critical_path: Vec<String>,
    #[serde(default)]
    pub dependency_warnings: Vec<String>,
}

impl DeploymentPlan {
    /// Number of resources across all groups.
    pub fn resource_count(&self) -> usize {
        self.deployment_groups.iter().map(Vec::len).sum()
    }

    /// Resource names per group, in execution order.
    pub fn group_names(&self) -> Vec<Vec<&str>> {
        self.deployment_groups
            .iter()
            .map(|g| g.iter().map(|r| r.resource_name.as_str()).collect())
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<&ResourceDependency> {
        self.deployment_groups
            .iter()
            .flatten()
            .find(|r| r.resource_name == name)
    }
}

/// What `optimize_for_parallel` changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub original_time_seconds: u64,
    pub optimized_time_seconds: u64,
    /// Negative when splitting made the plan slower.
    pub time_saved_seconds: i64,
    pub parallel_operations: usize,
    pub optimization_applied: bool,
}

/// Groups run sequentially; members of a group run in parallel, so each
/// group costs as much as its slowest member.
pub fn estimate_total_time(groups: &[Vec<ResourceDependency>]) -> u64 {
    groups
        .iter()
        .map(|g| {
            g.iter()
                .map(|r| r.estimated_deploy_time_seconds)
                .max()
                .unwrap_or(0)
        })
        .sum()
}

/// Resources that share their group with at least one other resource.
pub fn count_parallel_opportunities(groups: &[Vec<ResourceDependency>]) -> usize {
    groups.iter().filter(|g| g.len() > 1).map(Vec::len).sum()
}
