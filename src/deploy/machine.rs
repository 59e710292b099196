// ABOUTME: Deployment state machine driving a context through the transition table.
// ABOUTME: Checkpoints every step, retries with backoff, routes faults to remediation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::backend::ProvisioningBackend;
use crate::remediation::ErrorHandler;
use crate::store::{CheckpointStore, DEFAULT_TTL, keys};

use super::context::{DeploymentContext, ErrorDetails, RollbackFailure};
use super::error::{DeployError, HandlerFault};
use super::handlers::{
    ApprovalHandler, ConfigurationHandler, HandlerOutcome, ProvisioningHandler, RollbackHandler,
    StateHandler, ValidationHandler, VerificationHandler,
};
use super::lease::DeploymentLease;
use super::state::{DeploymentState, StateTransition};
use super::transitions::TransitionTable;

/// Remediation is only attempted above this success probability.
const REMEDIATION_THRESHOLD: f64 = 0.6;
const CANCEL_MARKER: &str = "requested";
/// Headroom for a backend call still in flight when the deadline passes.
pub const LEASE_GRACE: Duration = Duration::from_secs(300);

/// Tunables for the driver and its standard handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSettings {
    /// Retry `n` waits `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Concurrent deploys within a group. 1 means strictly sequential.
    pub parallelism: usize,
    pub vm_core_quota: u32,
    pub store_ttl: Duration,
    /// Time since the last renewal after which another driver may break the
    /// lease. Defaults to the deployment timeout plus `LEASE_GRACE`.
    pub lease_max_age: Option<Duration>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(1),
            parallelism: 4,
            vm_core_quota: 100,
            store_ttl: DEFAULT_TTL,
            lease_max_age: None,
        }
    }
}

/// Drives deployments from PENDING to a terminal state.
pub struct DeploymentStateMachine {
    store: Arc<dyn CheckpointStore>,
    handlers: HashMap<DeploymentState, Arc<dyn StateHandler>>,
    transitions: TransitionTable,
    error_handler: Arc<ErrorHandler>,
    settings: MachineSettings,
}

impl DeploymentStateMachine {
    /// Machine with the standard transition table and handlers.
    pub fn new(
        backend: Arc<dyn ProvisioningBackend>,
        store: Arc<dyn CheckpointStore>,
        settings: MachineSettings,
    ) -> Self {
        let handlers: HashMap<DeploymentState, Arc<dyn StateHandler>> = HashMap::from([
            (
                DeploymentState::Validating,
                Arc::new(ValidationHandler::new(settings.vm_core_quota)) as Arc<dyn StateHandler>,
            ),
            (DeploymentState::Approved, Arc::new(ApprovalHandler::new())),
            (
                DeploymentState::Provisioning,
                Arc::new(ProvisioningHandler::new(
                    backend.clone(),
                    settings.parallelism,
                )),
            ),
            (
                DeploymentState::Configuring,
                Arc::new(ConfigurationHandler::new(backend.clone())),
            ),
            (
                DeploymentState::Verifying,
                Arc::new(VerificationHandler::new(backend.clone())),
            ),
            (
                DeploymentState::RollingBack,
                Arc::new(RollbackHandler::new(backend)),
            ),
        ]);

        Self {
            store,
            handlers,
            transitions: TransitionTable::standard(),
            error_handler: Arc::new(ErrorHandler::new()),
            settings,
        }
    }

    /// Replace the handler for one state.
    pub fn with_handler(mut self, state: DeploymentState, handler: Arc<dyn StateHandler>) -> Self {
        self.handlers.insert(state, handler);
        self
    }

    pub fn with_transitions(mut self, transitions: TransitionTable) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn with_error_handler(mut self, error_handler: Arc<ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    /// Drive `ctx` until it reaches a terminal state, times out or hits an
    /// invalid transition.
    ///
    /// A failed deployment is still `Ok`; inspect the returned state.
    ///
    /// # Errors
    ///
    /// `DeployError::LeaseHeld` when another driver owns this deployment,
    /// store and encoding errors otherwise.
    pub async fn execute(
        &self,
        mut ctx: DeploymentContext,
    ) -> Result<DeploymentContext, DeployError> {
        let max_age = self
            .settings
            .lease_max_age
            .unwrap_or_else(|| timeout_budget(&ctx).saturating_add(LEASE_GRACE));
        let lease =
            DeploymentLease::acquire(self.store.clone(), ctx.deployment_id.as_str(), max_age)
                .await?;

        let driven = self.drive(&mut ctx, &lease).await;
        let released = lease.release().await;
        driven?;
        released?;
        Ok(ctx)
    }

    /// Persisted context of a deployment, if any.
    pub async fn get_status(
        &self,
        deployment_id: &str,
    ) -> Result<Option<DeploymentContext>, DeployError> {
        let Some(raw) = self.store.get(&keys::context(deployment_id)).await? else {
            return Ok(None);
        };
        let ctx = serde_json::from_str(&raw).map_err(DeployError::codec("deployment context"))?;
        Ok(Some(ctx))
    }

    /// Continue a persisted deployment. The handler of the state it stopped
    /// in runs again; handlers skip work that is already done.
    pub async fn resume(&self, deployment_id: &str) -> Result<DeploymentContext, DeployError> {
        let mut ctx = self
            .get_status(deployment_id)
            .await?
            .ok_or_else(|| DeployError::NotFound(deployment_id.to_string()))?;

        if !ctx.is_terminal() && self.handlers.contains_key(&ctx.state) {
            tracing::info!(
                deployment_id,
                state = %ctx.state,
                "Re-entering interrupted state"
            );
            ctx.revert_state();
        }
        self.execute(ctx).await
    }

    /// Ask a running (or persisted) deployment to stop. Takes effect at the
    /// next iteration while the deployment is still cancellable.
    pub async fn request_cancel(&self, deployment_id: &str) -> Result<(), DeployError> {
        if self.get_status(deployment_id).await?.is_none() {
            return Err(DeployError::NotFound(deployment_id.to_string()));
        }
        self.store
            .put(
                &keys::cancel(deployment_id),
                CANCEL_MARKER,
                self.settings.store_ttl,
            )
            .await?;
        tracing::info!(deployment_id, "Cancellation requested");
        Ok(())
    }

    async fn drive(
        &self,
        ctx: &mut DeploymentContext,
        lease: &DeploymentLease,
    ) -> Result<(), DeployError> {
        // Budget runs from initiation, across resumes.
        let elapsed = (Utc::now() - ctx.initiated_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let deadline = Instant::now() + timeout_budget(ctx).saturating_sub(elapsed);
        let mut routed: Option<StateTransition> = None;

        tracing::info!(
            deployment_id = %ctx.deployment_id,
            environment = %ctx.environment,
            state = %ctx.state,
            resource_count = ctx.resources.len(),
            "Starting deployment"
        );

        loop {
            if ctx.is_terminal() {
                break;
            }

            if Instant::now() >= deadline {
                tracing::error!(
                    deployment_id = %ctx.deployment_id,
                    state = %ctx.state,
                    timeout_minutes = ctx.timeout_minutes,
                    "Deployment timed out"
                );
                let from = ctx.state;
                ctx.enter(DeploymentState::Failed);
                let details = ctx.error_details_mut();
                details.reason = Some("timeout".to_string());
                details.state = Some(from);
                break;
            }

            lease.renew().await?;
            self.pick_up_cancel(ctx).await?;
            self.record_checkpoint(ctx).await?;

            let Some(event) = routed.take().or_else(|| next_event(ctx)) else {
                break;
            };

            let from = ctx.state;
            let Some(to) = self.transitions.next(from, event) else {
                let reason = format!("invalid transition: {from} -> {event}");
                tracing::error!(deployment_id = %ctx.deployment_id, %reason, "Stopping deployment");
                ctx.enter(DeploymentState::Failed);
                let details = ctx.error_details_mut();
                details.reason = Some(reason);
                details.state = Some(from);
                break;
            };

            if event == StateTransition::Fail && ctx.error_details.is_none() {
                ctx.error_details = Some(ErrorDetails {
                    state: Some(from),
                    ..ErrorDetails::reason(format!("{from} did not succeed"))
                });
            }

            tracing::info!(
                deployment_id = %ctx.deployment_id,
                from = %from,
                event = %event,
                to = %to,
                "State transition"
            );
            ctx.enter(to);
            self.persist(ctx).await?;

            let Some(handler) = self.handlers.get(&to).cloned() else {
                continue;
            };
            let outcome = handler.handle(ctx).await;
            if to == DeploymentState::RollingBack {
                record_rollback_failure(ctx, outcome);
                continue;
            }
            routed = match outcome {
                Ok(HandlerOutcome::Proceed) => None,
                Ok(HandlerOutcome::Failed { reason, retryable }) => {
                    self.on_failure(ctx, reason, retryable).await
                }
                Err(fault) => self.on_fault(ctx, fault).await,
            };
        }

        self.persist(ctx).await?;
        if ctx.state == DeploymentState::Cancelled {
            self.store
                .delete(&keys::cancel(ctx.deployment_id.as_str()))
                .await?;
        }

        tracing::info!(
            deployment_id = %ctx.deployment_id,
            state = %ctx.state,
            deployed = ctx.deployed_resources.len(),
            retries = ctx.retry_count,
            "Deployment finished"
        );
        Ok(())
    }

    async fn on_failure(
        &self,
        ctx: &mut DeploymentContext,
        reason: String,
        retryable: bool,
    ) -> Option<StateTransition> {
        let state = ctx.state;
        tracing::warn!(
            deployment_id = %ctx.deployment_id,
            state = %state,
            %reason,
            retryable,
            retry_count = ctx.retry_count,
            "State handler failed"
        );

        let details = ctx.error_details_mut();
        details.reason = Some(reason);
        details.state = Some(state);

        if retryable && ctx.retry_count < ctx.max_retries {
            self.retry(ctx).await;
            return None;
        }
        Some(self.route_failure(ctx))
    }

    async fn on_fault(
        &self,
        ctx: &mut DeploymentContext,
        fault: HandlerFault,
    ) -> Option<StateTransition> {
        let snapshot = ctx.error_context(fault.resource.as_deref());
        let analysis = self
            .error_handler
            .analyze_error(&fault.observed(), &snapshot);
        let plan = self
            .error_handler
            .generate_remediation_plan(&analysis, &snapshot);

        tracing::error!(
            deployment_id = %ctx.deployment_id,
            state = %ctx.state,
            resource = fault.resource.as_deref().unwrap_or(""),
            error_type = %analysis.error_type,
            category = %analysis.error_category,
            success_probability = plan.estimated_success_probability,
            error = %fault,
            "State handler fault"
        );

        let remediable = analysis.retry_feasible
            && plan.estimated_success_probability > REMEDIATION_THRESHOLD
            && ctx.retry_count < ctx.max_retries;
        let adjustments = plan.configuration_adjustments.clone();

        let state = ctx.state;
        let details = ctx.error_details_mut();
        details.reason = Some(analysis.root_cause.clone());
        details.state = Some(state);
        details.resource = fault.resource.clone();
        details.error = Some(fault.message.clone());
        details.analysis = Some(analysis);
        details.remediation = Some(plan);

        if remediable {
            let applied = ctx.apply_adjustments(&adjustments, fault.resource.as_deref());
            tracing::info!(
                deployment_id = %ctx.deployment_id,
                adjustments = applied,
                "Applying remediation and retrying"
            );
            self.retry(ctx).await;
            return None;
        }
        Some(self.route_failure(ctx))
    }

    async fn retry(&self, ctx: &mut DeploymentContext) {
        ctx.retry_count += 1;
        let delay = backoff(self.settings.backoff_base, ctx.retry_count);
        tracing::info!(
            deployment_id = %ctx.deployment_id,
            retry_count = ctx.retry_count,
            max_retries = ctx.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying state"
        );
        tokio::time::sleep(delay).await;
        ctx.revert_state();
    }

    /// Rollback when there is something to undo and the current state has a
    /// rollback edge; validation failures never roll back.
    fn route_failure(&self, ctx: &DeploymentContext) -> StateTransition {
        if ctx.rollback_eligible()
            && ctx.state != DeploymentState::Validating
            && self
                .transitions
                .next(ctx.state, StateTransition::Rollback)
                .is_some()
        {
            StateTransition::Rollback
        } else {
            StateTransition::Fail
        }
    }

    async fn pick_up_cancel(&self, ctx: &mut DeploymentContext) -> Result<(), DeployError> {
        if ctx.cancel_requested {
            return Ok(());
        }
        let marker = self
            .store
            .get(&keys::cancel(ctx.deployment_id.as_str()))
            .await?;
        if marker.is_some() {
            tracing::info!(
                deployment_id = %ctx.deployment_id,
                state = %ctx.state,
                "Picked up cancel request"
            );
            ctx.cancel_requested = true;
        }
        Ok(())
    }

    async fn record_checkpoint(&self, ctx: &mut DeploymentContext) -> Result<(), DeployError> {
        let checkpoint = ctx.checkpoint();
        let json = serde_json::to_string(&checkpoint).map_err(DeployError::codec("checkpoint"))?;
        let key = keys::checkpoint(ctx.deployment_id.as_str(), ctx.checkpoints.len());
        self.store.put(&key, &json, self.settings.store_ttl).await?;
        ctx.checkpoints.push(checkpoint);
        Ok(())
    }

    async fn persist(&self, ctx: &DeploymentContext) -> Result<(), DeployError> {
        let json =
            serde_json::to_string(ctx).map_err(DeployError::codec("deployment context"))?;
        self.store
            .put(
                &keys::context(ctx.deployment_id.as_str()),
                &json,
                self.settings.store_ttl,
            )
            .await?;
        Ok(())
    }
}

/// Event the context's data asks for, if any.
pub fn next_event(ctx: &DeploymentContext) -> Option<StateTransition> {
    use DeploymentState as S;
    use StateTransition as T;

    if ctx.cancel_requested && ctx.state.is_cancellable() {
        return Some(T::Cancel);
    }

    let event = match ctx.state {
        S::Pending => T::Validate,
        S::Validating if ctx.validation_results.valid == Some(true) => T::Approve,
        S::Validating => T::Fail,
        S::Approved => T::Provision,
        S::Provisioning if ctx.deployed_resources.is_empty() => T::Fail,
        S::Provisioning => T::Configure,
        S::Configuring => T::Verify,
        S::Verifying if ctx.validation_results.verified == Some(true) => T::Complete,
        S::Verifying => T::Fail,
        S::Failed if ctx.rollback_eligible() => T::Rollback,
        S::RollingBack => T::Complete,
        S::Failed | S::Completed | S::RolledBack | S::Cancelled => return None,
    };
    Some(event)
}

/// Rollback is attempted once. Whatever goes wrong is recorded and the
/// deployment still ends ROLLED_BACK.
fn record_rollback_failure(
    ctx: &mut DeploymentContext,
    outcome: Result<HandlerOutcome, HandlerFault>,
) {
    let (resource, error) = match outcome {
        Ok(HandlerOutcome::Proceed) => return,
        Ok(HandlerOutcome::Failed { reason, .. }) => (String::new(), reason),
        Err(fault) => (fault.resource.unwrap_or_default(), fault.message),
    };
    tracing::warn!(
        deployment_id = %ctx.deployment_id,
        resource = %resource,
        %error,
        "Rollback did not complete cleanly"
    );
    ctx.error_details_mut()
        .rollback_failures
        .push(RollbackFailure { resource, error });
}

fn timeout_budget(ctx: &DeploymentContext) -> Duration {
    Duration::from_secs(ctx.timeout_minutes.saturating_mul(60))
}

fn backoff(base: Duration, retry_count: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(retry_count))
}
