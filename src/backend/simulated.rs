// ABOUTME: Simulated provisioning backend with scripted failures and call recording.
// ABOUTME: Backs the CLI deploy command and the state machine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::resource::{DeployedResource, ResourceSpec};

use super::{BackendError, DeploymentTarget, ProvisioningBackend, VerificationCheck};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Deploy,
    Rollback,
    Configure,
    Verify,
}

/// When a scripted failure fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// First matching call only.
    Once,
    /// Every matching call.
    Always,
    /// While the resource attribute `key` equals `value`. Only meaningful for
    /// deploy calls, where the full spec is available.
    WhileAttribute { key: String, value: String },
}

#[derive(Debug, Clone)]
struct ScriptedFailure {
    operation: Operation,
    /// Resource name, or check name for verify calls. `None` matches anything.
    subject: Option<String>,
    trigger: Trigger,
    error: BackendError,
    spent: bool,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub operation: Operation,
    pub subject: String,
}

#[derive(Debug, Default)]
pub struct SimulatedBackend {
    failures: Mutex<Vec<ScriptedFailure>>,
    calls: Mutex<Vec<BackendCall>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every deploy call, so concurrent calls overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail(
        self,
        operation: Operation,
        subject: Option<&str>,
        trigger: Trigger,
        error: BackendError,
    ) -> Self {
        self.failures.lock().push(ScriptedFailure {
            operation,
            subject: subject.map(str::to_string),
            trigger,
            error,
            spent: false,
        });
        self
    }

    pub fn fail_once(self, operation: Operation, subject: &str, error: BackendError) -> Self {
        self.fail(operation, Some(subject), Trigger::Once, error)
    }

    pub fn fail_always(self, operation: Operation, subject: &str, error: BackendError) -> Self {
        self.fail(operation, Some(subject), Trigger::Always, error)
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Subjects of recorded calls for one operation, in call order.
    pub fn subjects(&self, operation: Operation) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.subject.clone())
            .collect()
    }

    /// Highest number of deploy calls that were running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record(
        &self,
        operation: Operation,
        subject: &str,
        spec: Option<&ResourceSpec>,
    ) -> Result<(), BackendError> {
        self.calls.lock().push(BackendCall {
            operation,
            subject: subject.to_string(),
        });

        let mut failures = self.failures.lock();
        for failure in failures.iter_mut() {
            if failure.operation != operation || failure.spent {
                continue;
            }
            if failure.subject.as_deref().is_some_and(|s| s != subject) {
                continue;
            }
            let fires = match &failure.trigger {
                Trigger::Once => {
                    failure.spent = true;
                    true
                }
                Trigger::Always => true,
                Trigger::WhileAttribute { key, value } => {
                    spec.and_then(|s| s.attribute(key)) == Some(value.as_str())
                }
            };
            if fires {
                tracing::debug!(?operation, subject, error = %failure.error, "Simulated failure");
                return Err(failure.error.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProvisioningBackend for SimulatedBackend {
    async fn deploy(
        &self,
        resource: &ResourceSpec,
        target: &DeploymentTarget,
    ) -> Result<DeployedResource, BackendError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let outcome = self.record(Operation::Deploy, &resource.name, Some(resource));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome?;

        let id = target.resource_id(&resource.resource_type, &resource.name);
        tracing::debug!(resource = %resource.name, id = %id, "Simulated deploy");
        Ok(DeployedResource::deployed(resource, id))
    }

    async fn rollback(
        &self,
        resource: &DeployedResource,
        _target: &DeploymentTarget,
    ) -> Result<(), BackendError> {
        self.record(Operation::Rollback, &resource.name, None)
    }

    async fn configure(
        &self,
        resource: &DeployedResource,
        _target: &DeploymentTarget,
    ) -> Result<(), BackendError> {
        self.record(Operation::Configure, &resource.name, None)
    }

    async fn verify(
        &self,
        check: VerificationCheck,
        _deployed: &[DeployedResource],
        _target: &DeploymentTarget,
    ) -> Result<(), BackendError> {
        self.record(Operation::Verify, check.as_str(), None)
    }
}
