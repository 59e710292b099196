// ABOUTME: Deployment lifecycle states and the events that move between them.
// ABOUTME: Both serialize in snake_case for persisted contexts and checkpoints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// Initial state, nothing has run yet.
    Pending,
    Validating,
    Approved,
    Provisioning,
    Configuring,
    Verifying,
    Completed,
    /// Terminal unless rollback is enabled and something was deployed.
    Failed,
    RollingBack,
    RolledBack,
    Cancelled,
}

impl DeploymentState {
    pub const ALL: [DeploymentState; 11] = [
        DeploymentState::Pending,
        DeploymentState::Validating,
        DeploymentState::Approved,
        DeploymentState::Provisioning,
        DeploymentState::Configuring,
        DeploymentState::Verifying,
        DeploymentState::Completed,
        DeploymentState::Failed,
        DeploymentState::RollingBack,
        DeploymentState::RolledBack,
        DeploymentState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Pending => "pending",
            DeploymentState::Validating => "validating",
            DeploymentState::Approved => "approved",
            DeploymentState::Provisioning => "provisioning",
            DeploymentState::Configuring => "configuring",
            DeploymentState::Verifying => "verifying",
            DeploymentState::Completed => "completed",
            DeploymentState::Failed => "failed",
            DeploymentState::RollingBack => "rolling_back",
            DeploymentState::RolledBack => "rolled_back",
            DeploymentState::Cancelled => "cancelled",
        }
    }

    /// States no event ever leaves.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            DeploymentState::Completed | DeploymentState::RolledBack | DeploymentState::Cancelled
        )
    }

    /// States an external cancel request can still stop.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            DeploymentState::Pending | DeploymentState::Validating | DeploymentState::Approved
        )
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTransition {
    Start,
    Validate,
    Approve,
    Provision,
    Configure,
    Verify,
    Complete,
    Fail,
    Rollback,
    Cancel,
}

impl StateTransition {
    pub const ALL: [StateTransition; 10] = [
        StateTransition::Start,
        StateTransition::Validate,
        StateTransition::Approve,
        StateTransition::Provision,
        StateTransition::Configure,
        StateTransition::Verify,
        StateTransition::Complete,
        StateTransition::Fail,
        StateTransition::Rollback,
        StateTransition::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateTransition::Start => "start",
            StateTransition::Validate => "validate",
            StateTransition::Approve => "approve",
            StateTransition::Provision => "provision",
            StateTransition::Configure => "configure",
            StateTransition::Verify => "verify",
            StateTransition::Complete => "complete",
            StateTransition::Fail => "fail",
            StateTransition::Rollback => "rollback",
            StateTransition::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for StateTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
