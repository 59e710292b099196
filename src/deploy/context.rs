// ABOUTME: DeploymentContext, the mutable unit of work driven by the state machine.
// ABOUTME: Also holds the typed history, checkpoint, validation and error detail records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::analyzer::{DeploymentPlan, normalize_type};
use crate::backend::DeploymentTarget;
use crate::remediation::{ConfigurationAdjustments, ErrorAnalysis, ErrorContext, RemediationPlan};
use crate::resource::{DeployedResource, ResourceSpec};
use crate::types::{ApprovalToken, DeploymentId, Environment};

use super::state::DeploymentState;

pub const DEFAULT_LOCATION: &str = "westeurope";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 60;

/// One entry of the state history: the state that was left and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: DeploymentState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    pub state: DeploymentState,
    pub deployed_resources: usize,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    pub fn pass() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackFailure {
    pub resource: String,
    pub error: String,
}

/// Why the deployment is (or was) unhappy. Every failure path fills at least
/// one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DeploymentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_failed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_failed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ErrorAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback_failures: Vec<RollbackFailure>,
}

impl ErrorDetails {
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentContext {
    pub deployment_id: DeploymentId,
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
    pub environment: Environment,
    pub initiated_by: String,
    pub initiated_at: DateTime<Utc>,
    /// Roles held by the initiator, checked by the permission validator.
    pub roles: Vec<String>,

    pub state: DeploymentState,
    pub state_history: Vec<HistoryEntry>,

    pub resources: Vec<ResourceSpec>,
    pub deployed_resources: Vec<DeployedResource>,
    pub plan: Option<DeploymentPlan>,

    pub validation_results: ValidationResults,
    pub error_details: Option<ErrorDetails>,
    pub checkpoints: Vec<Checkpoint>,

    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_minutes: u64,
    pub approval_token: Option<ApprovalToken>,
    pub rollback_enabled: bool,
    pub dry_run: bool,
    pub cancel_requested: bool,
    pub metadata: Map<String, Value>,
}

impl Default for DeploymentContext {
    fn default() -> Self {
        Self {
            deployment_id: DeploymentId::generate(),
            subscription_id: String::new(),
            resource_group: String::new(),
            location: DEFAULT_LOCATION.to_string(),
            environment: Environment::default(),
            initiated_by: String::new(),
            initiated_at: Utc::now(),
            roles: Vec::new(),
            state: DeploymentState::Pending,
            state_history: Vec::new(),
            resources: Vec::new(),
            deployed_resources: Vec::new(),
            plan: None,
            validation_results: ValidationResults::default(),
            error_details: None,
            checkpoints: Vec::new(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            approval_token: None,
            rollback_enabled: true,
            dry_run: false,
            cancel_requested: false,
            metadata: Map::new(),
        }
    }
}

impl DeploymentContext {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        resources: Vec<ResourceSpec>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            resources,
            ..Default::default()
        }
    }

    /// Something was deployed and rollback is switched on.
    pub fn rollback_eligible(&self) -> bool {
        self.rollback_enabled && !self.deployed_resources.is_empty()
    }

    /// No event will ever be emitted from here.
    pub fn is_terminal(&self) -> bool {
        self.state.is_final()
            || (self.state == DeploymentState::Failed && !self.rollback_eligible())
    }

    pub fn is_deployed(&self, name: &str) -> bool {
        self.deployed_resources.iter().any(|r| r.name == name)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn target(&self) -> DeploymentTarget {
        DeploymentTarget {
            deployment_id: self.deployment_id.to_string(),
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            location: self.location.clone(),
            environment: self.environment,
        }
    }

    /// Record leaving the current state and enter `next`.
    pub fn enter(&mut self, next: DeploymentState) {
        self.state_history.push(HistoryEntry {
            state: self.state,
            at: Utc::now(),
        });
        self.state = next;
    }

    /// Return to the most recently left state, without touching history.
    pub fn revert_state(&mut self) {
        self.state = self
            .state_history
            .last()
            .map(|entry| entry.state)
            .unwrap_or(DeploymentState::Pending);
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            timestamp: Utc::now(),
            state: self.state,
            deployed_resources: self.deployed_resources.len(),
            retry_count: self.retry_count,
        }
    }

    pub fn error_details_mut(&mut self) -> &mut ErrorDetails {
        self.error_details.get_or_insert_with(ErrorDetails::default)
    }

    /// Snapshot handed to the error handler. The primary resource is the
    /// failing one when known, else the first resource.
    pub fn error_context(&self, failing: Option<&str>) -> ErrorContext {
        let primary = failing
            .and_then(|name| self.resource(name))
            .or_else(|| self.resources.first());
        let attribute =
            |key: &str| primary.and_then(|r| r.attribute(key)).map(str::to_string);

        ErrorContext {
            resource_type: primary.map(|r| normalize_type(&r.resource_type)),
            location: attribute("location").or_else(|| Some(self.location.clone())),
            environment: Some(self.environment.to_string()),
            subscription_id: Some(self.subscription_id.clone()),
            resource_group: Some(self.resource_group.clone()),
            deployment_state: Some(self.state.to_string()),
            retry_count: self.retry_count,
            state_history: self
                .state_history
                .iter()
                .map(|entry| entry.state.to_string())
                .collect(),
            sku: attribute("sku"),
            vm_size: attribute("vm_size"),
            address_space: attribute("address_space"),
            cidr: attribute("cidr"),
            principal_id: attribute("principal_id"),
        }
    }

    /// Apply remediation adjustments in place. Location goes to the context
    /// and every resource carrying one; resource-level settings go to the
    /// failing resource, or the first resource of the adjusted type.
    ///
    /// Returns the number of values written.
    pub fn apply_adjustments(
        &mut self,
        adjustments: &ConfigurationAdjustments,
        failing: Option<&str>,
    ) -> usize {
        let mut applied = 0;

        if let Some(location) = &adjustments.location {
            self.location = location.clone();
            applied += 1;
            for resource in &mut self.resources {
                if resource.attribute("location").is_some() {
                    resource.set_attribute("location", location.clone());
                    applied += 1;
                }
            }
        }

        let resource_level = [
            ("sku", &adjustments.sku),
            ("vm_size", &adjustments.vm_size),
            ("address_space", &adjustments.address_space),
            ("subnet_cidr", &adjustments.subnet_cidr),
        ];
        if resource_level.iter().all(|(_, value)| value.is_none()) {
            return applied;
        }

        let wanted_type = adjustments.resource_type.as_deref().map(normalize_type);
        let index = failing
            .and_then(|name| self.resources.iter().position(|r| r.name == name))
            .or_else(|| {
                let wanted = wanted_type.as_deref()?;
                self.resources
                    .iter()
                    .position(|r| normalize_type(&r.resource_type) == wanted)
            });

        let Some(index) = index else {
            tracing::warn!(
                deployment_id = %self.deployment_id,
                "No resource to receive configuration adjustments"
            );
            return applied;
        };

        let resource = &mut self.resources[index];
        for (key, value) in resource_level {
            if let Some(value) = value {
                resource.set_attribute(key, value.clone());
                applied += 1;
            }
        }
        applied
    }
}
