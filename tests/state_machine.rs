// ABOUTME: Integration tests for the deployment state machine.
// ABOUTME: Drives contexts through the simulated backend and in-memory store.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use skyplan::backend::{BackendError, Operation, SimulatedBackend, Trigger};
use skyplan::deploy::{
    DeployErrorKind, DeploymentContext, DeploymentState, DeploymentStateMachine, HandlerFault,
    HandlerOutcome, LeaseInfo, MachineSettings, RollbackFailure, StateHandler, StateTransition,
    TransitionTable,
};
use skyplan::remediation::ErrorCategory;
use skyplan::resource::{DeployedResource, ResourceSpec};
use skyplan::store::{CheckpointStore, DEFAULT_TTL, MemoryStore, keys};
use skyplan::types::Environment;

struct Harness {
    backend: Arc<SimulatedBackend>,
    store: Arc<MemoryStore>,
    machine: DeploymentStateMachine,
}

fn harness(backend: SimulatedBackend, settings: MachineSettings) -> Harness {
    support::init_tracing();
    let backend = Arc::new(backend);
    let store = Arc::new(MemoryStore::new());
    let machine = DeploymentStateMachine::new(backend.clone(), store.clone(), settings);
    Harness {
        backend,
        store,
        machine,
    }
}

fn sequential() -> MachineSettings {
    MachineSettings {
        parallelism: 1,
        ..support::fast_settings()
    }
}

fn deployed_names(ctx: &DeploymentContext) -> Vec<String> {
    ctx.deployed_resources.iter().map(|r| r.name.clone()).collect()
}

async fn persist(store: &MemoryStore, ctx: &DeploymentContext) {
    let json = serde_json::to_string(ctx).unwrap();
    store
        .put(&keys::context(ctx.deployment_id.as_str()), &json, DEFAULT_TTL)
        .await
        .unwrap();
}

/// Fails retryably every time and counts its invocations.
#[derive(Default)]
struct FlakyHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl StateHandler for FlakyHandler {
    async fn handle(&self, _ctx: &mut DeploymentContext) -> Result<HandlerOutcome, HandlerFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HandlerOutcome::retryable("configuration endpoint unavailable"))
    }
}

/// Returns the same result on every call.
struct ScriptedHandler(Result<HandlerOutcome, HandlerFault>);

#[async_trait]
impl StateHandler for ScriptedHandler {
    async fn handle(&self, _ctx: &mut DeploymentContext) -> Result<HandlerOutcome, HandlerFault> {
        self.0.clone()
    }
}

mod lifecycle {
    use super::*;

    /// Test: A dev deployment runs every state once and persists the result.
    #[tokio::test]
    async fn dev_deployment_completes() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let ctx = support::dev_context(support::web_stack());
        let id = ctx.deployment_id.clone();

        let done = h.machine.execute(ctx).await.unwrap();

        assert_eq!(done.state, DeploymentState::Completed);
        assert_eq!(done.deployed_resources.len(), 5);
        assert_eq!(done.retry_count, 0);
        assert_eq!(done.validation_results.valid, Some(true));
        assert_eq!(done.validation_results.verified, Some(true));
        assert!(done.error_details.is_none());

        let left: Vec<_> = done.state_history.iter().map(|e| e.state).collect();
        assert_eq!(
            left,
            vec![
                DeploymentState::Pending,
                DeploymentState::Validating,
                DeploymentState::Approved,
                DeploymentState::Provisioning,
                DeploymentState::Configuring,
                DeploymentState::Verifying,
            ]
        );

        let checkpoint_keys = h
            .store
            .keys_with_prefix(&format!("deployment:checkpoint:{}:", id.as_str()));
        assert_eq!(checkpoint_keys.len(), done.checkpoints.len());
        assert_eq!(done.checkpoints[0].state, DeploymentState::Pending);

        let persisted = h.machine.get_status(id.as_str()).await.unwrap().unwrap();
        assert_eq!(persisted.state, DeploymentState::Completed);
        assert_eq!(persisted.deployed_resources, done.deployed_resources);

        assert_eq!(h.backend.subjects(Operation::Configure).len(), 5);
        assert_eq!(
            h.backend.subjects(Operation::Verify),
            vec!["connectivity", "configuration", "security"]
        );
        assert!(
            h.store
                .get(&keys::lease(id.as_str()))
                .await
                .unwrap()
                .is_none()
        );
    }

    /// Test: The web app is deployed after its plan even without an explicit edge.
    #[tokio::test]
    async fn grouped_provisioning_respects_inferred_plan() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let done = h
            .machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        let order = h.backend.subjects(Operation::Deploy);
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(position("shop-plan") < position("shop"));
        assert!(position("rg") < position("net"));
        assert!(position("net") < position("apps"));
        assert_eq!(done.state, DeploymentState::Completed);
    }

    /// Test: Production needs one approval round trip before provisioning.
    #[tokio::test]
    async fn prod_deployment_waits_for_approval_token() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let mut ctx = support::dev_context(vec![ResourceSpec::new("storage_account", "logs")]);
        ctx.environment = Environment::Prod;
        ctx.roles = vec!["admin".to_string()];

        let done = h.machine.execute(ctx).await.unwrap();

        assert_eq!(done.state, DeploymentState::Completed);
        assert_eq!(done.retry_count, 1);
        assert!(done.approval_token.is_some());
        assert!(done.metadata.contains_key("approval_requested_at"));
        // The retry returns to validating and approves a second time.
        let validations_left = done
            .state_history
            .iter()
            .filter(|e| e.state == DeploymentState::Validating)
            .count();
        assert_eq!(validations_left, 2);
    }

    /// Test: A dry run records placeholders and never calls the backend.
    #[tokio::test]
    async fn dry_run_skips_backend() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let mut ctx = support::dev_context(support::web_stack());
        ctx.environment = Environment::Staging;
        ctx.dry_run = true;

        let done = h.machine.execute(ctx).await.unwrap();

        assert_eq!(done.state, DeploymentState::Completed);
        assert!(done.deployed_resources.iter().all(|r| r.is_dry_run()));
        assert!(done.approval_token.is_none());
        assert!(h.backend.calls().is_empty());
    }

    /// Test: A zero timeout fails the deployment before anything runs.
    #[tokio::test]
    async fn zero_timeout_fails_immediately() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let mut ctx = support::dev_context(support::web_stack());
        ctx.timeout_minutes = 0;

        let done = h.machine.execute(ctx).await.unwrap();

        assert_eq!(done.state, DeploymentState::Failed);
        let details = done.error_details.unwrap();
        assert_eq!(details.reason.as_deref(), Some("timeout"));
        assert_eq!(details.state, Some(DeploymentState::Pending));
        assert!(h.backend.calls().is_empty());
    }

    /// Test: An event with no table entry stops the deployment as failed.
    #[tokio::test]
    async fn missing_transition_fails_deployment() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let machine = h.machine.with_transitions(
            TransitionTable::standard()
                .without_edge(DeploymentState::Approved, StateTransition::Provision),
        );

        let done = machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::Failed);
        assert_eq!(
            done.error_details.unwrap().reason.as_deref(),
            Some("invalid transition: approved -> provision")
        );
        assert!(h.backend.calls().is_empty());
    }
}

mod validation {
    use super::*;

    /// Test: Prod without the admin role fails validation and never rolls back.
    #[tokio::test]
    async fn prod_without_admin_fails_validation() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let mut ctx = support::dev_context(support::web_stack());
        ctx.environment = Environment::Prod;

        let done = h.machine.execute(ctx).await.unwrap();

        assert_eq!(done.state, DeploymentState::Failed);
        assert_eq!(done.retry_count, 0);
        assert_eq!(done.validation_results.valid, Some(false));
        let details = done.error_details.unwrap();
        assert_eq!(details.validation_failed.as_deref(), Some("permissions"));
        assert_eq!(details.state, Some(DeploymentState::Validating));
        assert!(h.backend.calls().is_empty());
    }

    /// Test: An explicit dependency cycle is a validation failure.
    #[tokio::test]
    async fn dependency_cycle_fails_validation() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let ctx = support::dev_context(vec![
            ResourceSpec::new("vnet", "a").depends_on(["b"]),
            ResourceSpec::new("subnet", "b").depends_on(["a"]),
        ]);

        let done = h.machine.execute(ctx).await.unwrap();

        assert_eq!(done.state, DeploymentState::Failed);
        let details = done.error_details.unwrap();
        assert_eq!(details.validation_failed.as_deref(), Some("dependencies"));
        assert!(details.error.unwrap().contains("circular dependency"));
    }

    /// Test: VM cores beyond the configured quota stop the deployment.
    #[tokio::test]
    async fn core_quota_is_enforced() {
        let settings = MachineSettings {
            vm_core_quota: 6,
            ..support::fast_settings()
        };
        let h = harness(SimulatedBackend::new(), settings);
        let ctx = support::dev_context(vec![
            ResourceSpec::new("virtual_machine", "web").with_attribute("vm_size", "Standard_D4s_v3"),
            ResourceSpec::new("virtual_machine", "db").with_attribute("vm_size", "Standard_D4s_v3"),
        ]);

        let done = h.machine.execute(ctx).await.unwrap();

        assert_eq!(done.state, DeploymentState::Failed);
        assert_eq!(
            done.error_details.unwrap().validation_failed.as_deref(),
            Some("quotas")
        );
    }
}

mod retries {
    use super::*;

    /// Test: A handler that keeps failing is retried until the budget is
    /// spent, then the deployment rolls back.
    #[tokio::test]
    async fn exhausted_retries_roll_back() {
        let flaky = Arc::new(FlakyHandler::default());
        let h = harness(SimulatedBackend::new(), sequential());
        let machine = h
            .machine
            .with_handler(DeploymentState::Configuring, flaky.clone());
        let mut ctx = support::dev_context(support::web_stack());
        ctx.max_retries = 2;

        let done = machine.execute(ctx).await.unwrap();

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(done.retry_count, 2);
        assert_eq!(done.state, DeploymentState::RolledBack);
        assert_eq!(
            done.error_details.as_ref().unwrap().reason.as_deref(),
            Some("configuration endpoint unavailable")
        );

        let mut expected = deployed_names(&done);
        expected.reverse();
        assert_eq!(h.backend.subjects(Operation::Rollback), expected);
        assert_eq!(done.deployed_resources.len(), 5);
    }

    /// Test: With rollback disabled the same failure ends in FAILED.
    #[tokio::test]
    async fn exhausted_retries_without_rollback_fail() {
        let flaky = Arc::new(FlakyHandler::default());
        let h = harness(SimulatedBackend::new(), sequential());
        let machine = h
            .machine
            .with_handler(DeploymentState::Configuring, flaky.clone());
        let mut ctx = support::dev_context(support::web_stack());
        ctx.max_retries = 2;
        ctx.rollback_enabled = false;

        let done = machine.execute(ctx).await.unwrap();

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(done.state, DeploymentState::Failed);
        assert!(h.backend.subjects(Operation::Rollback).is_empty());
    }

    /// Test: A one-off rejection is absorbed by a single retry.
    #[tokio::test]
    async fn transient_rejection_is_retried() {
        let backend = SimulatedBackend::new().fail_once(
            Operation::Deploy,
            "net",
            BackendError::rejected("throttled"),
        );
        let h = harness(backend, sequential());

        let done = h
            .machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::Completed);
        assert_eq!(done.retry_count, 1);
        let net_attempts = h
            .backend
            .subjects(Operation::Deploy)
            .iter()
            .filter(|n| n.as_str() == "net")
            .count();
        assert_eq!(net_attempts, 2);
        let rg_attempts = h
            .backend
            .subjects(Operation::Deploy)
            .iter()
            .filter(|n| n.as_str() == "rg")
            .count();
        assert_eq!(rg_attempts, 1);
    }

    /// Test: Rollback undoes resources newest first and records failures
    /// without stopping.
    #[tokio::test]
    async fn rollback_runs_in_reverse_and_records_failures() {
        let backend = SimulatedBackend::new()
            .fail_always(Operation::Deploy, "shop", BackendError::rejected("busy"))
            .fail_always(Operation::Rollback, "net", BackendError::rejected("locked"));
        let h = harness(backend, sequential());

        let done = h
            .machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::RolledBack);
        assert_eq!(done.retry_count, 3);
        assert_eq!(
            h.backend.subjects(Operation::Rollback),
            vec!["shop-plan", "apps", "net", "rg"]
        );
        let details = done.error_details.unwrap();
        assert_eq!(details.resource.as_deref(), Some("shop"));
        assert_eq!(details.rollback_failures.len(), 1);
        assert_eq!(details.rollback_failures[0].resource, "net");
        assert_eq!(details.rollback_failures[0].error, "locked");
    }

    /// Test: A rejected verification check is retried, then rolled back.
    #[tokio::test]
    async fn failing_verification_rolls_back() {
        let backend = SimulatedBackend::new().fail_always(
            Operation::Verify,
            "security",
            BackendError::rejected("public endpoint exposed"),
        );
        let h = harness(backend, support::fast_settings());

        let done = h
            .machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::RolledBack);
        assert_eq!(done.validation_results.verified, Some(false));
        assert_eq!(
            done.error_details.unwrap().verification_failed.as_deref(),
            Some("security")
        );
        // Configuration is not repeated on verification retries.
        assert_eq!(h.backend.subjects(Operation::Configure).len(), 5);
    }
    /// Test: A retryable rollback failure is recorded, never retried, and the
    /// deployment still ends ROLLED_BACK.
    #[tokio::test]
    async fn failing_rollback_is_recorded_not_retried() {
        let h = harness(SimulatedBackend::new(), sequential());
        let machine = h
            .machine
            .with_handler(
                DeploymentState::Configuring,
                Arc::new(ScriptedHandler(Ok(HandlerOutcome::fatal("config broke")))),
            )
            .with_handler(
                DeploymentState::RollingBack,
                Arc::new(ScriptedHandler(Ok(HandlerOutcome::retryable(
                    "rollback broke",
                )))),
            );

        let done = machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::RolledBack);
        assert_eq!(done.retry_count, 0);
        assert!(
            done.state_history
                .iter()
                .all(|entry| entry.state != DeploymentState::Verifying)
        );
        let details = done.error_details.unwrap();
        assert_eq!(details.reason.as_deref(), Some("config broke"));
        assert_eq!(
            details.rollback_failures,
            vec![RollbackFailure {
                resource: String::new(),
                error: "rollback broke".to_string(),
            }]
        );
    }

    /// Test: A fault during rollback skips remediation and still ends ROLLED_BACK.
    #[tokio::test]
    async fn faulting_rollback_is_recorded() {
        let h = harness(SimulatedBackend::new(), sequential());
        let machine = h
            .machine
            .with_handler(
                DeploymentState::Configuring,
                Arc::new(ScriptedHandler(Ok(HandlerOutcome::fatal("config broke")))),
            )
            .with_handler(
                DeploymentState::RollingBack,
                Arc::new(ScriptedHandler(Err(
                    HandlerFault::new("rollback exploded").for_resource("rg"),
                ))),
            );

        let done = machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::RolledBack);
        assert_eq!(done.retry_count, 0);
        let details = done.error_details.unwrap();
        assert_eq!(details.reason.as_deref(), Some("config broke"));
        assert!(details.analysis.is_none());
        assert_eq!(details.rollback_failures[0].resource, "rg");
        assert_eq!(details.rollback_failures[0].error, "rollback exploded");
    }
}

mod remediation {
    use super::*;

    /// Test: An unavailable SKU is swapped for the catalog alternative and
    /// the retry succeeds.
    #[tokio::test]
    async fn unavailable_sku_is_remediated() {
        let backend = SimulatedBackend::new().fail(
            Operation::Deploy,
            Some("shop"),
            Trigger::WhileAttribute {
                key: "sku".to_string(),
                value: "S1".to_string(),
            },
            BackendError::fault("SkuNotAvailable", "The requested SKU is not available"),
        );
        let h = harness(backend, support::fast_settings());

        let done = h
            .machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::Completed);
        assert_eq!(done.retry_count, 1);
        assert_eq!(done.resource("shop").unwrap().attribute("sku"), Some("B1"));

        let details = done.error_details.unwrap();
        assert_eq!(details.resource.as_deref(), Some("shop"));
        let analysis = details.analysis.unwrap();
        assert_eq!(analysis.error_type, "InvalidSku");
        assert_eq!(analysis.error_category, ErrorCategory::Configuration);
        assert!(details.remediation.unwrap().estimated_success_probability > 0.6);
    }

    /// Test: A quota fault is below the remediation threshold, so the
    /// deployment rolls back without retrying.
    #[tokio::test]
    async fn quota_fault_is_not_retried() {
        let backend = SimulatedBackend::new().fail_always(
            Operation::Deploy,
            "apps",
            BackendError::fault("QuotaExceeded", "Quota exceeded for cores in westeurope"),
        );
        let h = harness(backend, sequential());

        let done = h
            .machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::RolledBack);
        assert_eq!(done.retry_count, 0);
        assert_eq!(deployed_names(&done), vec!["rg", "net"]);
        assert_eq!(h.backend.subjects(Operation::Rollback), vec!["net", "rg"]);

        let details = done.error_details.unwrap();
        let analysis = details.analysis.unwrap();
        assert_eq!(analysis.error_category, ErrorCategory::Capacity);
        assert_eq!(
            details.reason.as_deref(),
            Some("Resource quota exceeded for subnet in westeurope")
        );
    }

    /// Test: A fault on the very first resource fails without rollback.
    #[tokio::test]
    async fn fault_before_anything_deployed_fails() {
        let backend = SimulatedBackend::new().fail_always(
            Operation::Deploy,
            "rg",
            BackendError::fault("AuthorizationFailed", "Authorization failed for scope"),
        );
        let h = harness(backend, sequential());

        let done = h
            .machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::Failed);
        assert!(done.deployed_resources.is_empty());
        let analysis = done.error_details.unwrap().analysis.unwrap();
        assert_eq!(analysis.error_category, ErrorCategory::Security);
        assert!(!analysis.retry_feasible);
    }
}

mod concurrency {
    use super::*;

    fn independent() -> Vec<ResourceSpec> {
        (0..4)
            .map(|i| ResourceSpec::new("storage_account", format!("store{i}")))
            .collect()
    }

    /// Test: Resources in one group are deployed concurrently.
    #[tokio::test]
    async fn group_members_deploy_in_parallel() {
        let backend = SimulatedBackend::new().with_latency(Duration::from_millis(50));
        let h = harness(backend, support::fast_settings());

        let done = h
            .machine
            .execute(support::dev_context(independent()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::Completed);
        assert!(h.backend.peak_concurrency() > 1);
    }

    /// Test: Parallelism 1 deploys one resource at a time in dependency order.
    #[tokio::test]
    async fn parallelism_one_is_sequential() {
        let backend = SimulatedBackend::new().with_latency(Duration::from_millis(5));
        let h = harness(backend, sequential());
        let resources = vec![
            ResourceSpec::new("webapp", "app").depends_on(["plan"]),
            ResourceSpec::new("app_service_plan", "plan").depends_on(["rg"]),
            ResourceSpec::new("resource_group", "rg"),
        ];

        let done = h
            .machine
            .execute(support::dev_context(resources))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::Completed);
        assert_eq!(h.backend.peak_concurrency(), 1);
        assert_eq!(h.backend.subjects(Operation::Deploy), vec!["rg", "plan", "app"]);
    }

    /// Test: A live lease held elsewhere blocks a second driver.
    #[tokio::test]
    async fn live_lease_blocks_execution() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let ctx = support::dev_context(support::web_stack());
        let mut holder = LeaseInfo::new(ctx.deployment_id.as_str());
        holder.holder = "other-host".to_string();
        h.store
            .put_if_absent(
                &keys::lease(ctx.deployment_id.as_str()),
                &serde_json::to_string(&holder).unwrap(),
                DEFAULT_TTL,
            )
            .await
            .unwrap();

        let err = h.machine.execute(ctx).await.unwrap_err();

        assert_eq!(err.kind(), DeployErrorKind::LeaseHeld);
        assert_eq!(err.lease_holder_info().unwrap().holder, "other-host");
        assert!(h.backend.calls().is_empty());
    }

    /// Test: A lease older than the maximum age is broken.
    #[tokio::test]
    async fn stale_lease_is_broken() {
        let settings = MachineSettings {
            lease_max_age: Some(Duration::from_secs(60)),
            ..support::fast_settings()
        };
        let h = harness(SimulatedBackend::new(), settings);
        let ctx = support::dev_context(vec![ResourceSpec::new("key_vault", "secrets")]);
        let mut holder = LeaseInfo::new(ctx.deployment_id.as_str());
        holder.started_at = chrono::Utc::now() - chrono::Duration::hours(2);
        h.store
            .put(
                &keys::lease(ctx.deployment_id.as_str()),
                &serde_json::to_string(&holder).unwrap(),
                DEFAULT_TTL,
            )
            .await
            .unwrap();

        let done = h.machine.execute(ctx).await.unwrap();
        assert_eq!(done.state, DeploymentState::Completed);
    }
}

mod resume_and_cancel {
    use super::*;

    /// Test: Resuming an interrupted provisioning step only deploys what is left.
    #[tokio::test]
    async fn resume_continues_interrupted_provisioning() {
        let h = harness(SimulatedBackend::new(), sequential());
        let mut ctx = support::dev_context(support::web_stack());
        ctx.enter(DeploymentState::Validating);
        ctx.validation_results.valid = Some(true);
        ctx.enter(DeploymentState::Approved);
        ctx.enter(DeploymentState::Provisioning);
        let rg = ctx.resources[0].clone();
        ctx.deployed_resources
            .push(DeployedResource::deployed(&rg, "/subscriptions/sub-123/rg"));
        persist(&h.store, &ctx).await;

        let done = h
            .machine
            .resume(ctx.deployment_id.as_str())
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::Completed);
        assert_eq!(
            h.backend.subjects(Operation::Deploy),
            vec!["net", "apps", "shop-plan", "shop"]
        );
        assert_eq!(done.deployed_resources.len(), 5);
    }

    /// Test: Resume keeps the original deadline instead of starting a new one.
    #[tokio::test]
    async fn resume_keeps_original_deadline() {
        let h = harness(SimulatedBackend::new(), sequential());
        let mut ctx = support::dev_context(support::web_stack());
        ctx.timeout_minutes = 60;
        ctx.initiated_at = chrono::Utc::now() - chrono::Duration::hours(2);
        ctx.enter(DeploymentState::Validating);
        ctx.validation_results.valid = Some(true);
        ctx.enter(DeploymentState::Approved);
        ctx.enter(DeploymentState::Provisioning);
        persist(&h.store, &ctx).await;

        let done = h
            .machine
            .resume(ctx.deployment_id.as_str())
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::Failed);
        assert_eq!(
            done.error_details.unwrap().reason.as_deref(),
            Some("timeout")
        );
        assert!(h.backend.calls().is_empty());
    }

    /// Test: Resuming a finished deployment changes nothing.
    #[tokio::test]
    async fn resume_of_completed_deployment_is_a_no_op() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let done = h
            .machine
            .execute(support::dev_context(vec![ResourceSpec::new("key_vault", "kv")]))
            .await
            .unwrap();
        let calls = h.backend.calls().len();

        let again = h
            .machine
            .resume(done.deployment_id.as_str())
            .await
            .unwrap();

        assert_eq!(again.state, DeploymentState::Completed);
        assert_eq!(h.backend.calls().len(), calls);
    }

    /// Test: Unknown deployments cannot be resumed or cancelled.
    #[tokio::test]
    async fn unknown_deployment_is_not_found() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());

        let err = h.machine.resume("nope").await.unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::NotFound);

        let err = h.machine.request_cancel("nope").await.unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::NotFound);

        assert!(h.machine.get_status("nope").await.unwrap().is_none());
    }

    /// Test: A cancel request is picked up before validation starts and the
    /// marker is cleared afterwards.
    #[tokio::test]
    async fn cancel_request_stops_pending_deployment() {
        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let ctx = support::dev_context(support::web_stack());
        let id = ctx.deployment_id.clone();
        persist(&h.store, &ctx).await;

        h.machine.request_cancel(id.as_str()).await.unwrap();
        let done = h.machine.resume(id.as_str()).await.unwrap();

        assert_eq!(done.state, DeploymentState::Cancelled);
        assert!(done.cancel_requested);
        assert!(h.backend.calls().is_empty());
        assert!(
            h.store
                .get(&keys::cancel(id.as_str()))
                .await
                .unwrap()
                .is_none()
        );
        let persisted = h.machine.get_status(id.as_str()).await.unwrap().unwrap();
        assert_eq!(persisted.state, DeploymentState::Cancelled);
    }

    /// Test: Cancelling after provisioning started has no effect.
    #[tokio::test]
    async fn cancel_is_ignored_once_provisioning() {
        struct CancelDuringConfigure;

        #[async_trait]
        impl StateHandler for CancelDuringConfigure {
            async fn handle(
                &self,
                ctx: &mut DeploymentContext,
            ) -> Result<HandlerOutcome, HandlerFault> {
                ctx.cancel_requested = true;
                Ok(HandlerOutcome::Proceed)
            }
        }

        let h = harness(SimulatedBackend::new(), support::fast_settings());
        let machine = h
            .machine
            .with_handler(DeploymentState::Configuring, Arc::new(CancelDuringConfigure));

        let done = machine
            .execute(support::dev_context(support::web_stack()))
            .await
            .unwrap();

        assert_eq!(done.state, DeploymentState::Completed);
        assert!(done.cancel_requested);
    }
}
