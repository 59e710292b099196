// ABOUTME: Explain command implementation.
// ABOUTME: Runs the error handler on a message and prints analysis plus remediation.

use serde::Serialize;
use skyplan::error::Result;
use skyplan::output::Output;
use skyplan::remediation::{
    ErrorAnalysis, ErrorContext, ErrorHandler, ObservedError, RemediationPlan,
};
use std::fmt::Write;

pub struct ExplainArgs {
    pub message: String,
    pub code: Option<String>,
    pub resource_type: Option<String>,
    pub location: Option<String>,
    pub sku: Option<String>,
}

#[derive(Serialize)]
struct ExplainDocument {
    analysis: ErrorAnalysis,
    remediation: RemediationPlan,
}

pub fn explain(args: ExplainArgs, output: Output) -> Result<()> {
    let error = ObservedError {
        code: args.code,
        message: args.message,
    };
    let context = ErrorContext {
        resource_type: args.resource_type,
        location: args.location,
        sku: args.sku,
        ..Default::default()
    };

    let handler = ErrorHandler::new();
    let analysis = handler.analyze_error(&error, &context);
    let remediation = handler.generate_remediation_plan(&analysis, &context);

    let document = ExplainDocument {
        analysis,
        remediation,
    };
    output.document(&document, || render(&document));
    Ok(())
}

fn render(document: &ExplainDocument) -> String {
    let analysis = &document.analysis;
    let plan = &document.remediation;
    let mut text = String::new();

    let _ = writeln!(
        text,
        "{} ({}, {} severity)",
        analysis.error_type, analysis.error_category, analysis.severity
    );
    let _ = writeln!(text, "Root cause: {}", analysis.root_cause);
    let _ = writeln!(
        text,
        "Retry feasible: {}, manual intervention: {}, ~{} min",
        analysis.retry_feasible,
        analysis.requires_manual_intervention,
        analysis.estimated_resolution_time_minutes
    );
    if !analysis.recommended_regions.is_empty() {
        let _ = writeln!(
            text,
            "Recommended regions: {}",
            analysis.recommended_regions.join(", ")
        );
    }
    let _ = writeln!(text, "Primary action: {}", plan.primary_action);
    for action in &plan.backup_actions {
        let _ = writeln!(text, "  - {action}");
    }
    if !plan.configuration_adjustments.is_empty() {
        let adjustments = serde_json::to_string(&plan.configuration_adjustments)
            .unwrap_or_default();
        let _ = writeln!(text, "Adjustments: {adjustments}");
    }
    let _ = writeln!(text, "Execution order: {}", plan.execution_order.join(" -> "));
    let _ = writeln!(
        text,
        "Success probability: {:.0}%",
        plan.estimated_success_probability * 100.0
    );
    text
}
