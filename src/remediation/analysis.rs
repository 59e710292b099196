// ABOUTME: Value types exchanged with the error handler.
// ABOUTME: Error context snapshot, analysis result, adjustments and remediation plan.

use serde::{Deserialize, Serialize};

/// Broad failure class driving which remediation is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Capacity,
    Security,
    Configuration,
    Network,
    Dependency,
    Performance,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Capacity => "capacity",
            ErrorCategory::Security => "security",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Network => "network",
            ErrorCategory::Dependency => "dependency",
            ErrorCategory::Performance => "performance",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Medium => f.write_str("medium"),
            Severity::High => f.write_str("high"),
        }
    }
}

/// The failure being analyzed: a message and, when the source supplied one,
/// a machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedError {
    pub code: Option<String>,
    pub message: String,
}

impl ObservedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Snapshot of the deployment at the moment of failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub resource_type: Option<String>,
    pub location: Option<String>,
    pub environment: Option<String>,
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub deployment_state: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub state_history: Vec<String>,
    pub sku: Option<String>,
    pub vm_size: Option<String>,
    pub address_space: Option<String>,
    pub cidr: Option<String>,
    pub principal_id: Option<String>,
}

impl ErrorContext {
    pub(crate) fn resource_type_or(&self, fallback: &'static str) -> &str {
        self.resource_type.as_deref().unwrap_or(fallback)
    }

    pub(crate) fn location_or(&self, fallback: &'static str) -> &str {
        self.location.as_deref().unwrap_or(fallback)
    }

    /// VM size first, then SKU.
    pub(crate) fn vm_sku(&self) -> Option<&str> {
        self.vm_size.as_deref().or(self.sku.as_deref())
    }

    /// SKU first, then VM size.
    pub(crate) fn current_sku(&self) -> Option<&str> {
        self.sku.as_deref().or(self.vm_size.as_deref())
    }

    pub(crate) fn current_cidr(&self) -> Option<&str> {
        self.address_space.as_deref().or(self.cidr.as_deref())
    }
}

/// Concrete configuration changes a retry may apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationAdjustments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_space: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

impl ConfigurationAdjustments {
    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.sku.is_none()
            && self.vm_size.is_none()
            && self.address_space.is_none()
            && self.subnet_cidr.is_none()
            && self.resource_type.is_none()
    }

    /// Number of fields set.
    pub fn len(&self) -> usize {
        [
            &self.location,
            &self.sku,
            &self.vm_size,
            &self.address_space,
            &self.subnet_cidr,
            &self.resource_type,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }
}

/// An alternative configuration with the reason it was suggested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeConfiguration {
    #[serde(flatten)]
    pub adjustments: ConfigurationAdjustments,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub error_type: String,
    pub error_category: ErrorCategory,
    pub root_cause: String,
    pub severity: Severity,
    pub suggested_actions: Vec<String>,
    pub alternative_configurations: Vec<AlternativeConfiguration>,
    pub recommended_regions: Vec<String>,
    pub estimated_resolution_time_minutes: u32,
    pub retry_feasible: bool,
    pub requires_manual_intervention: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub primary_action: String,
    pub backup_actions: Vec<String>,
    pub configuration_adjustments: ConfigurationAdjustments,
    pub resource_alternatives: Vec<AlternativeConfiguration>,
    pub estimated_success_probability: f64,
    pub execution_order: Vec<String>,
}
