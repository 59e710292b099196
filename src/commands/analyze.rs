// ABOUTME: Analyze command implementation.
// ABOUTME: Prints the dependency groups, timing and critical path of a manifest.

use serde::Serialize;
use skyplan::analyzer::{DependencyAnalyzer, DeploymentPlan, OptimizationReport};
use skyplan::config::DeploymentManifest;
use skyplan::error::Result;
use skyplan::output::Output;
use std::fmt::Write;
use std::path::Path;

#[derive(Serialize)]
struct AnalyzeDocument<'a> {
    plan: &'a DeploymentPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    optimization: Option<&'a OptimizationReport>,
}

pub fn analyze(manifest_path: &Path, optimize: bool, output: Output) -> Result<()> {
    let manifest = DeploymentManifest::load(manifest_path)?;
    let analyzer = DependencyAnalyzer::new();
    let plan = analyzer.analyze(&manifest.resources, manifest.environment)?;

    let (plan, report) = if optimize {
        let (optimized, report) = analyzer.optimize_for_parallel(&plan);
        (optimized, Some(report))
    } else {
        (plan, None)
    };

    for warning in &plan.dependency_warnings {
        output.warning(warning);
    }

    let document = AnalyzeDocument {
        plan: &plan,
        optimization: report.as_ref(),
    };
    output.document(&document, || render_plan(&plan, report.as_ref()));
    Ok(())
}

pub(crate) fn render_plan(plan: &DeploymentPlan, report: Option<&OptimizationReport>) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "Deployment plan: {} resource(s) in {} group(s)",
        plan.resource_count(),
        plan.deployment_groups.len()
    );
    for (index, group) in plan.deployment_groups.iter().enumerate() {
        let members: Vec<String> = group
            .iter()
            .map(|r| {
                let marker = if r.can_deploy_parallel { "" } else { ", sequential" };
                format!(
                    "{} ({}, {}s{marker})",
                    r.resource_name, r.resource_type, r.estimated_deploy_time_seconds
                )
            })
            .collect();
        let _ = writeln!(text, "  Group {index}: {}", members.join(", "));
    }
    let _ = writeln!(
        text,
        "Estimated time: {}s",
        plan.total_estimated_time_seconds
    );
    let _ = writeln!(text, "Critical path: {}", plan.critical_path.join(" -> "));
    let _ = writeln!(
        text,
        "Parallel opportunities: {}",
        plan.parallel_opportunities
    );
    if let Some(report) = report {
        let _ = writeln!(
            text,
            "Optimization: {}s -> {}s (saved {}s)",
            report.original_time_seconds,
            report.optimized_time_seconds,
            report.time_saved_seconds
        );
    }
    text
}
