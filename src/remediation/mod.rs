// ABOUTME: Error handler that classifies deployment failures and proposes remediation.
// ABOUTME: Produces ErrorAnalysis and RemediationPlan values consumed by the state machine.

mod analysis;
mod catalog;
mod classify;

pub use analysis::{
    AlternativeConfiguration, ConfigurationAdjustments, ErrorAnalysis, ErrorCategory,
    ErrorContext, ObservedError, RemediationPlan, Severity,
};
pub use catalog::{sku_family, subnet_cidr};

use catalog::Catalog;
use classify::{Classifier, root_cause};

const MAX_ALTERNATIVES: usize = 3;

/// Classifies failures and synthesizes remediation plans.
///
/// Pure with respect to its inputs: the same error and context always give
/// the same analysis. Tables are compiled once in [`ErrorHandler::new`].
#[derive(Debug)]
pub struct ErrorHandler {
    classifier: Classifier,
    catalog: Catalog,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self {
            classifier: Classifier::builtin(),
            catalog: Catalog::builtin(),
        }
    }

    pub fn analyze_error(&self, error: &ObservedError, context: &ErrorContext) -> ErrorAnalysis {
        let message = error.message.to_lowercase();
        let classification = self.classifier.classify(&message);

        tracing::info!(
            code = error.code.as_deref().unwrap_or(""),
            message_length = message.len(),
            history_entries = context.state_history.len(),
            "Starting error analysis"
        );

        let error_type = classification
            .name
            .map(str::to_string)
            .or_else(|| error.code.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let cause = root_cause(
            &message,
            context.resource_type_or("unknown"),
            context.location_or("unknown"),
        );

        let mut analysis = ErrorAnalysis {
            error_type,
            error_category: classification.category,
            root_cause: cause,
            severity: classification.severity,
            suggested_actions: Vec::new(),
            alternative_configurations: Vec::new(),
            recommended_regions: Vec::new(),
            estimated_resolution_time_minutes: 5,
            retry_feasible: true,
            requires_manual_intervention: false,
        };

        match classification.category {
            ErrorCategory::Capacity => self.capacity(&mut analysis, &message, context),
            ErrorCategory::Configuration => self.configuration(&mut analysis, &message, context),
            ErrorCategory::Network => self.network(&mut analysis, context),
            ErrorCategory::Security => self.security(&mut analysis, context),
            ErrorCategory::Dependency => self.dependency(&mut analysis, &message, context),
            ErrorCategory::Performance | ErrorCategory::Unknown => generic(&mut analysis, context),
        }

        tracing::info!(
            error_category = %analysis.error_category,
            severity = %analysis.severity,
            suggested_actions = analysis.suggested_actions.len(),
            retry_feasible = analysis.retry_feasible,
            manual_intervention = analysis.requires_manual_intervention,
            "Error analysis completed"
        );

        analysis
    }

    pub fn generate_remediation_plan(
        &self,
        analysis: &ErrorAnalysis,
        _context: &ErrorContext,
    ) -> RemediationPlan {
        let primary_action = analysis
            .suggested_actions
            .first()
            .cloned()
            .unwrap_or_else(|| "Review configuration".to_string());
        let backup_actions = analysis
            .suggested_actions
            .iter()
            .skip(1)
            .cloned()
            .collect();

        let mut alternatives = analysis.alternative_configurations.iter();
        let mut configuration_adjustments = alternatives
            .next()
            .map(|alt| alt.adjustments.clone())
            .unwrap_or_default();
        let resource_alternatives = alternatives.cloned().collect();

        if let Some(region) = analysis.recommended_regions.first() {
            configuration_adjustments.location = Some(region.clone());
        }

        let plan = RemediationPlan {
            primary_action,
            backup_actions,
            configuration_adjustments,
            resource_alternatives,
            estimated_success_probability: success_probability(analysis),
            execution_order: execution_order(analysis.error_category)
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        tracing::info!(
            primary_action = %plan.primary_action,
            backup_actions = plan.backup_actions.len(),
            adjustments = plan.configuration_adjustments.len(),
            success_probability = plan.estimated_success_probability,
            "Remediation plan generated"
        );

        plan
    }

    fn capacity(&self, analysis: &mut ErrorAnalysis, message: &str, context: &ErrorContext) {
        let location = context.location_or("westeurope");
        let resource_type = context.resource_type_or("");

        analysis.recommended_regions = self
            .catalog
            .alternative_regions(location)
            .iter()
            .map(|r| r.to_string())
            .collect();

        if (message.contains("cores") || resource_type.to_lowercase().contains("vm"))
            && let Some(current) = context.vm_sku()
            && let Some(alternatives) = self.catalog.sku_alternatives("virtual_machines", current)
        {
            analysis.alternative_configurations = alternatives
                .iter()
                .take(MAX_ALTERNATIVES)
                .map(|alt| AlternativeConfiguration {
                    adjustments: ConfigurationAdjustments {
                        vm_size: Some(alt.to_string()),
                        ..Default::default()
                    },
                    reason: format!("Alternative to {current}"),
                })
                .collect();
        }

        let region = analysis
            .recommended_regions
            .first()
            .map(String::as_str)
            .unwrap_or("northeurope");
        analysis.suggested_actions = vec![
            format!("Request quota increase for {resource_type} in {location}"),
            format!("Retry deployment in alternative region: {region}"),
            "Consider using smaller resource sizes to reduce quota usage".to_string(),
            "Review current resource utilization and cleanup unused resources".to_string(),
        ];
        analysis.estimated_resolution_time_minutes = 30;
        analysis.requires_manual_intervention = true;
    }

    fn configuration(&self, analysis: &mut ErrorAnalysis, message: &str, context: &ErrorContext) {
        let resource_type = context.resource_type_or("");
        let location = context.location_or("westeurope");

        if message.contains("sku")
            && let Some(current) = context.current_sku()
            && let Some(family) = sku_family(resource_type)
            && let Some(alternatives) = self.catalog.sku_alternatives(family, current)
        {
            analysis.alternative_configurations = alternatives
                .iter()
                .take(MAX_ALTERNATIVES)
                .map(|alt| AlternativeConfiguration {
                    adjustments: ConfigurationAdjustments {
                        sku: Some(alt.to_string()),
                        resource_type: Some(resource_type.to_string()),
                        ..Default::default()
                    },
                    reason: format!("Available alternative to {current} in {location}"),
                })
                .collect();
        }

        let available = analysis
            .alternative_configurations
            .first()
            .and_then(|alt| alt.adjustments.sku.as_deref())
            .unwrap_or("Standard_B1s");
        analysis.suggested_actions = vec![
            format!("Switch to available SKU: {available}"),
            format!("Verify SKU availability in {location} region"),
            "Review resource requirements and select appropriate tier".to_string(),
            "Check Azure service availability by region documentation".to_string(),
        ];
        analysis.retry_feasible = true;
        analysis.estimated_resolution_time_minutes = 5;
    }

    fn network(&self, analysis: &mut ErrorAnalysis, context: &ErrorContext) {
        let free = self
            .catalog
            .free_cidrs(context.current_cidr(), MAX_ALTERNATIVES);

        analysis.alternative_configurations = free
            .iter()
            .map(|cidr| AlternativeConfiguration {
                adjustments: ConfigurationAdjustments {
                    address_space: Some(cidr.to_string()),
                    subnet_cidr: Some(subnet_cidr(cidr)),
                    ..Default::default()
                },
                reason: "Alternative network range to avoid conflicts".to_string(),
            })
            .collect();

        let first = free.first().copied().unwrap_or("10.1.0.0/16");
        analysis.suggested_actions = vec![
            format!("Use alternative CIDR range: {first}"),
            "Verify existing network configurations in target region".to_string(),
            "Consider using non-overlapping address spaces".to_string(),
            "Review VNet peering and connectivity requirements".to_string(),
        ];
        analysis.retry_feasible = true;
        analysis.estimated_resolution_time_minutes = 10;
    }

    fn security(&self, analysis: &mut ErrorAnalysis, context: &ErrorContext) {
        let resource_type = context.resource_type_or("");
        let principal = context
            .principal_id
            .as_deref()
            .unwrap_or("service_principal");
        let roles = self.catalog.required_roles(resource_type);

        let grant = roles
            .first()
            .map(|role| format!("Grant '{role}' role to {principal}"))
            .unwrap_or_else(|| "Review service principal permissions".to_string());
        analysis.suggested_actions = vec![
            grant,
            format!("Verify subscription-level access for {resource_type} deployment"),
            "Check resource group contributor permissions".to_string(),
            "Ensure service principal is not blocked by conditional access policies".to_string(),
        ];
        analysis.requires_manual_intervention = true;
        analysis.retry_feasible = false;
        analysis.estimated_resolution_time_minutes = 20;
    }

    fn dependency(&self, analysis: &mut ErrorAnalysis, message: &str, context: &ErrorContext) {
        let missing = self.catalog.missing_dependency(message);
        let resource_type = context.resource_type_or("");

        analysis.suggested_actions = vec![
            format!("Create missing dependency: {missing}"),
            format!("Check deployment order for {resource_type}"),
            "Validate parent resource configurations".to_string(),
            "Review resource naming consistency".to_string(),
        ];
        analysis.retry_feasible = true;
        analysis.estimated_resolution_time_minutes = 15;
    }
}

fn generic(analysis: &mut ErrorAnalysis, context: &ErrorContext) {
    let resource_type = context.resource_type_or("");
    let location = context.location_or("westeurope");

    analysis.suggested_actions = vec![
        format!("Review {resource_type} configuration parameters"),
        format!("Verify resource quotas and limits in {location}"),
        "Check Azure service health status".to_string(),
        "Retry deployment with exponential backoff".to_string(),
    ];
    analysis.retry_feasible = true;
    analysis.estimated_resolution_time_minutes = 10;
}

fn success_probability(analysis: &ErrorAnalysis) -> f64 {
    let has_alternatives = !analysis.alternative_configurations.is_empty();
    let mut probability = match analysis.error_category {
        ErrorCategory::Configuration if has_alternatives => 0.9,
        ErrorCategory::Capacity if !analysis.recommended_regions.is_empty() => 0.8,
        ErrorCategory::Network if has_alternatives => 0.85,
        ErrorCategory::Security => 0.6,
        _ => 0.7,
    };

    if analysis.requires_manual_intervention {
        probability *= 0.8;
    }
    if analysis.severity == Severity::High {
        probability *= 0.9;
    }

    f64::min(probability, 1.0)
}

fn execution_order(category: ErrorCategory) -> [&'static str; 3] {
    match category {
        ErrorCategory::Capacity => [
            "adjust_resource_size",
            "try_alternative_region",
            "request_quota_increase",
        ],
        ErrorCategory::Configuration => [
            "update_configuration",
            "validate_parameters",
            "retry_deployment",
        ],
        ErrorCategory::Network => [
            "adjust_network_config",
            "validate_connectivity",
            "retry_deployment",
        ],
        ErrorCategory::Security => ["verify_permissions", "update_rbac", "retry_deployment"],
        ErrorCategory::Dependency => [
            "create_dependencies",
            "validate_order",
            "retry_deployment",
        ],
        ErrorCategory::Performance | ErrorCategory::Unknown => [
            "analyze_logs",
            "adjust_configuration",
            "retry_deployment",
        ],
    }
}
