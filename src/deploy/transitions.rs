// ABOUTME: Explicit (state, event) -> state transition table for the deployment machine.
// ABOUTME: The driver never moves between states without an entry in this map.

use std::collections::HashMap;

use super::state::{DeploymentState, StateTransition};

use super::state::DeploymentState as S;
use super::state::StateTransition as T;

const STANDARD_EDGES: &[(DeploymentState, StateTransition, DeploymentState)] = &[
    (S::Pending, T::Validate, S::Validating),
    (S::Pending, T::Start, S::Validating),
    (S::Validating, T::Approve, S::Approved),
    (S::Approved, T::Provision, S::Provisioning),
    (S::Provisioning, T::Configure, S::Configuring),
    (S::Configuring, T::Verify, S::Verifying),
    (S::Verifying, T::Complete, S::Completed),
    (S::Validating, T::Fail, S::Failed),
    (S::Approved, T::Fail, S::Failed),
    (S::Provisioning, T::Fail, S::Failed),
    (S::Configuring, T::Fail, S::Failed),
    (S::Verifying, T::Fail, S::Failed),
    (S::Provisioning, T::Rollback, S::RollingBack),
    (S::Configuring, T::Rollback, S::RollingBack),
    (S::Verifying, T::Rollback, S::RollingBack),
    (S::Failed, T::Rollback, S::RollingBack),
    (S::RollingBack, T::Complete, S::RolledBack),
    (S::Pending, T::Cancel, S::Cancelled),
    (S::Validating, T::Cancel, S::Cancelled),
    (S::Approved, T::Cancel, S::Cancelled),
];

/// Finite map from `(state, event)` to the next state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    edges: HashMap<(DeploymentState, StateTransition), DeploymentState>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl TransitionTable {
    /// A table with no edges.
    pub fn empty() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        Self {
            edges: STANDARD_EDGES
                .iter()
                .map(|&(from, event, to)| ((from, event), to))
                .collect(),
        }
    }

    pub fn with_edge(
        mut self,
        from: DeploymentState,
        event: StateTransition,
        to: DeploymentState,
    ) -> Self {
        self.edges.insert((from, event), to);
        self
    }

    pub fn without_edge(mut self, from: DeploymentState, event: StateTransition) -> Self {
        self.edges.remove(&(from, event));
        self
    }

    pub fn next(&self, from: DeploymentState, event: StateTransition) -> Option<DeploymentState> {
        self.edges.get(&(from, event)).copied()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// All edges, sorted for stable output.
    pub fn edges(&self) -> Vec<(DeploymentState, StateTransition, DeploymentState)> {
        let mut edges: Vec<_> = self
            .edges
            .iter()
            .map(|(&(from, event), &to)| (from, event, to))
            .collect();
        edges.sort_by_key(|(from, event, _)| (from.as_str(), event.as_str()));
        edges
    }
}
