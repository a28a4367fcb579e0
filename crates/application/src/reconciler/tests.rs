use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use landlord_core::TenantId;
use landlord_domain::{
    ExecutionError, ExecutionState, NewTenantInput, Tenant, TenantStatus, TriggerSource,
    WorkflowExecutionStatus, WorkflowSubState, compute_config_hash,
};
use serde_json::{Map, json};

use super::{Reconciler, ReconcilerConfig};
use crate::compute_resolver::ComputeProviderResolver;
use crate::metrics::ControllerMetrics;
use crate::tenant_ports::TenantRepository;
use crate::test_support::{FakeTenantRepository, ScriptedWorkflowProvider};
use crate::work_queue::RateLimitedQueue;
use crate::workflow_client::WorkflowClient;
use crate::workflow_ports::WorkflowProviderRegistry;

struct Harness {
    reconciler: Arc<Reconciler>,
    repository: Arc<FakeTenantRepository>,
    provider: Arc<ScriptedWorkflowProvider>,
    queue: RateLimitedQueue,
}

fn harness(config: ReconcilerConfig) -> Harness {
    let repository = Arc::new(FakeTenantRepository::new());
    let provider = Arc::new(ScriptedWorkflowProvider::new());
    let registry = Arc::new(WorkflowProviderRegistry::new());
    registry
        .register(provider.clone())
        .unwrap_or_else(|_| unreachable!());
    let resolver = Arc::new(ComputeProviderResolver::new(
        repository.clone(),
        None,
        Duration::from_secs(300),
    ));
    let metrics = Arc::new(ControllerMetrics::new().unwrap_or_else(|_| unreachable!()));
    let workflow_client = Arc::new(WorkflowClient::new(
        registry,
        "scripted",
        "tenant-provisioner",
        resolver,
        metrics.clone(),
    ));
    let queue = RateLimitedQueue::new();
    let reconciler = Arc::new(Reconciler::new(
        repository.clone(),
        workflow_client,
        queue.clone(),
        metrics,
        config,
    ));
    Harness {
        reconciler,
        repository,
        provider,
        queue,
    }
}

fn fast_config() -> ReconcilerConfig {
    ReconcilerConfig {
        reconciliation_interval: Duration::from_millis(10),
        workflow_trigger_timeout: Duration::from_millis(500),
        shutdown_timeout: Duration::from_millis(500),
        stop_poll_interval: Duration::from_millis(5),
        stop_poll_timeout: Duration::from_millis(50),
        ..ReconcilerConfig::default()
    }
}

fn demo_config() -> Map<String, serde_json::Value> {
    let mut config = Map::new();
    config.insert("image".to_owned(), json!("nginx:alpine"));
    config
}

fn demo_tenant() -> Tenant {
    Tenant::new(NewTenantInput {
        name: "demo".to_owned(),
        desired_image: "nginx:alpine".to_owned(),
        desired_config: demo_config(),
        labels: HashMap::new(),
        annotations: HashMap::new(),
    })
    .unwrap_or_else(|_| unreachable!())
}

async fn seed(harness: &Harness, tenant: Tenant) -> Tenant {
    harness.repository.seed(tenant).await
}

fn running_with_backoff(execution_id: &str) -> WorkflowExecutionStatus {
    let mut status = WorkflowExecutionStatus::new(execution_id, ExecutionState::Running);
    status
        .metadata
        .insert("retry_state".to_owned(), "backoff".to_owned());
    status
}

#[tokio::test]
async fn happy_create_triggers_provisioning() {
    let harness = harness(fast_config());
    let tenant = seed(&harness, demo_tenant()).await;

    harness.reconciler.process_key(tenant.id).await;

    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Provisioning);
    assert_eq!(
        stored.workflow_execution_id.as_deref(),
        Some(format!("tenant-{}-provision", tenant.id).as_str())
    );
    assert_eq!(
        stored.workflow_config_hash.as_deref(),
        Some(compute_config_hash(&tenant.desired_config).as_str())
    );

    let transitions = harness.repository.transitions().await;
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].from_status, TenantStatus::Requested);
    assert_eq!(transitions[0].to_status, TenantStatus::Provisioning);
    assert_eq!(transitions[0].triggered_by, TriggerSource::Controller);

    // Successful pass resets the retry counter.
    assert_eq!(harness.queue.retries(tenant.id), 0);
}

#[tokio::test]
async fn succeeded_execution_moves_tenant_to_ready() {
    let harness = harness(fast_config());
    let tenant = seed(&harness, demo_tenant()).await;

    harness.reconciler.process_key(tenant.id).await;
    let provisioning = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    let execution_id = provisioning
        .workflow_execution_id
        .clone()
        .unwrap_or_default();

    harness
        .provider
        .script_status(WorkflowExecutionStatus::new(
            execution_id.as_str(),
            ExecutionState::Succeeded,
        ))
        .await;
    harness.reconciler.process_key(tenant.id).await;

    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Ready);
    assert!(stored.workflow_execution_id.is_none());
    assert!(stored.workflow_sub_state.is_none());
    assert!(stored.workflow_retry_count.is_none());
    assert!(stored.workflow_error_message.is_none());

    let transitions = harness.repository.transitions().await;
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[1].from_status, TenantStatus::Provisioning);
    assert_eq!(transitions[1].to_status, TenantStatus::Ready);
    assert_eq!(transitions[1].triggered_by, TriggerSource::Controller);
}

#[tokio::test]
async fn backing_off_execution_restarts_on_config_change() {
    let harness = harness(fast_config());
    let mut tenant = demo_tenant();
    let old_hash = compute_config_hash(&tenant.desired_config);
    tenant.status = TenantStatus::Provisioning;
    tenant.workflow_execution_id = Some("exec-A".to_owned());
    tenant.workflow_config_hash = Some(old_hash.clone());
    tenant
        .desired_config
        .insert("image".to_owned(), json!("nginx:1.27"));
    let new_hash = compute_config_hash(&tenant.desired_config);
    assert_ne!(old_hash, new_hash);
    let tenant = seed(&harness, tenant).await;

    harness
        .provider
        .script_status(running_with_backoff("exec-A"))
        .await;
    harness.reconciler.process_key(tenant.id).await;

    let stops = harness.provider.stops().await;
    assert_eq!(
        stops,
        vec![("exec-A".to_owned(), "Configuration updated".to_owned())]
    );

    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Provisioning);
    let new_execution = stored.workflow_execution_id.clone().unwrap_or_default();
    assert_ne!(new_execution, "exec-A");
    assert_eq!(stored.workflow_config_hash.as_deref(), Some(new_hash.as_str()));

    let invocations = harness.provider.invocations().await;
    assert_eq!(invocations.len(), 1);
    assert_eq!(
        invocations[0].metadata.get("trigger_source").map(String::as_str),
        Some("controller:config-change")
    );
}

#[tokio::test]
async fn healthy_execution_survives_config_change() {
    let harness = harness(fast_config());
    let mut tenant = demo_tenant();
    let old_hash = compute_config_hash(&tenant.desired_config);
    tenant.status = TenantStatus::Provisioning;
    tenant.workflow_execution_id = Some("exec-A".to_owned());
    tenant.workflow_config_hash = Some(old_hash.clone());
    tenant
        .desired_config
        .insert("image".to_owned(), json!("nginx:1.27"));
    let tenant = seed(&harness, tenant).await;

    harness
        .provider
        .script_status(WorkflowExecutionStatus::new(
            "exec-A",
            ExecutionState::Running,
        ))
        .await;
    harness.reconciler.process_key(tenant.id).await;

    assert!(harness.provider.stops().await.is_empty());
    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.workflow_execution_id.as_deref(), Some("exec-A"));
    assert_eq!(stored.workflow_config_hash.as_deref(), Some(old_hash.as_str()));
    assert_eq!(stored.workflow_sub_state, Some(WorkflowSubState::Running));
}

#[tokio::test]
async fn retry_budget_exhaustion_fails_the_tenant() {
    let mut config = fast_config();
    config.max_retries = 3;
    let harness = harness(config);
    let tenant = seed(&harness, demo_tenant()).await;
    harness.provider.fail_invocations(100).await;

    for expected_retries in 1..=3 {
        harness.reconciler.process_key(tenant.id).await;
        assert_eq!(harness.queue.retries(tenant.id), expected_retries);
        let stored = harness
            .repository
            .get_by_id(tenant.id)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(stored.status, TenantStatus::Requested);
    }

    harness.reconciler.process_key(tenant.id).await;

    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Failed);
    assert!(stored.status_message.contains("retries exhausted"));

    let transitions = harness.repository.transitions().await;
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].from_status, TenantStatus::Requested);
    assert_eq!(transitions[0].to_status, TenantStatus::Failed);
    assert_eq!(harness.queue.retries(tenant.id), 0);
}

#[tokio::test]
async fn terminal_tenants_are_skipped_entirely() {
    let harness = harness(fast_config());
    for (name, status) in [
        ("ready", TenantStatus::Ready),
        ("archived", TenantStatus::Archived),
        ("failed", TenantStatus::Failed),
    ] {
        let mut tenant = Tenant::new(NewTenantInput {
            name: name.to_owned(),
            desired_image: "nginx:alpine".to_owned(),
            desired_config: demo_config(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
        })
        .unwrap_or_else(|_| unreachable!());
        tenant.status = status;
        let tenant = seed(&harness, tenant).await;
        harness.reconciler.process_key(tenant.id).await;
    }

    let reconcilable = harness
        .repository
        .list_for_reconciliation()
        .await
        .unwrap_or_default();
    assert!(reconcilable.is_empty());
    assert!(harness.provider.invocations().await.is_empty());
    assert!(harness.repository.transitions().await.is_empty());
}

#[tokio::test]
async fn version_conflicts_requeue_with_backoff() {
    let harness = harness(fast_config());
    let tenant = seed(&harness, demo_tenant()).await;
    harness.repository.inject_update_conflicts(1).await;

    harness.reconciler.process_key(tenant.id).await;
    assert_eq!(harness.queue.retries(tenant.id), 1);
    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Requested);

    // The retried pass collapses onto the execution started before the
    // conflicting write and settles normally.
    harness.reconciler.process_key(tenant.id).await;
    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Provisioning);
    assert_eq!(harness.queue.retries(tenant.id), 0);

    let invocations = harness.provider.invocations().await;
    assert_eq!(invocations.len(), 2);
    assert_eq!(
        invocations[0].execution_name,
        invocations[1].execution_name
    );
}

#[tokio::test]
async fn status_poll_failures_requeue_with_backoff() {
    let harness = harness(fast_config());
    let mut tenant = demo_tenant();
    tenant.status = TenantStatus::Provisioning;
    tenant.workflow_execution_id = Some("exec-A".to_owned());
    tenant.workflow_config_hash = Some(compute_config_hash(&tenant.desired_config));
    let tenant = seed(&harness, tenant).await;

    harness
        .provider
        .script_status(WorkflowExecutionStatus::new(
            "exec-A",
            ExecutionState::Running,
        ))
        .await;
    harness.provider.fail_status_polls(1).await;

    harness.reconciler.process_key(tenant.id).await;
    assert_eq!(harness.queue.retries(tenant.id), 1);

    // The next pass polls successfully and observes a healthy execution.
    harness.reconciler.process_key(tenant.id).await;
    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.workflow_sub_state, Some(WorkflowSubState::Running));
    assert_eq!(stored.workflow_execution_id.as_deref(), Some("exec-A"));
}

#[tokio::test]
async fn stop_poll_timeout_is_retryable() {
    let harness = harness(fast_config());
    let mut tenant = demo_tenant();
    tenant.status = TenantStatus::Provisioning;
    tenant.workflow_execution_id = Some("exec-A".to_owned());
    tenant.workflow_config_hash = Some("stale-hash".to_owned());
    let tenant = seed(&harness, tenant).await;

    harness
        .provider
        .script_status(running_with_backoff("exec-A"))
        .await;
    harness.provider.ignore_stop_requests().await;

    harness.reconciler.process_key(tenant.id).await;

    // Stop was requested but never confirmed: the pass fails retryable and
    // keeps the original execution handle for the next attempt.
    assert_eq!(harness.provider.stops().await.len(), 1);
    assert_eq!(harness.queue.retries(tenant.id), 1);
    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Provisioning);
    assert_eq!(stored.workflow_execution_id.as_deref(), Some("exec-A"));
}

#[tokio::test]
async fn null_config_hash_restarts_on_next_backoff() {
    let harness = harness(fast_config());
    let mut tenant = demo_tenant();
    tenant.status = TenantStatus::Provisioning;
    tenant.workflow_execution_id = Some("exec-A".to_owned());
    tenant.workflow_config_hash = None;
    let tenant = seed(&harness, tenant).await;

    harness
        .provider
        .script_status(running_with_backoff("exec-A"))
        .await;
    harness.reconciler.process_key(tenant.id).await;

    assert_eq!(harness.provider.stops().await.len(), 1);
    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(
        stored.workflow_config_hash.as_deref(),
        Some(compute_config_hash(&stored.desired_config).as_str())
    );
}

#[tokio::test]
async fn non_retryable_workflow_failure_fails_the_tenant() {
    let harness = harness(fast_config());
    let mut tenant = demo_tenant();
    tenant.status = TenantStatus::Provisioning;
    tenant.workflow_execution_id = Some("exec-A".to_owned());
    let tenant = seed(&harness, tenant).await;

    let mut failed = WorkflowExecutionStatus::new("exec-A", ExecutionState::Failed);
    failed.error = Some(ExecutionError {
        message: "invalid compute configuration".to_owned(),
        kind: Some("validation".to_owned()),
        retryable: false,
    });
    harness.provider.script_status(failed).await;

    harness.reconciler.process_key(tenant.id).await;

    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Failed);
    assert_eq!(
        stored.status_message,
        "invalid compute configuration"
    );
    assert_eq!(
        stored.workflow_error_message.as_deref(),
        Some("invalid compute configuration")
    );
    // Execution handle is retained for audit on the fatal branch.
    assert_eq!(stored.workflow_execution_id.as_deref(), Some("exec-A"));
}

#[tokio::test]
async fn transient_workflow_failure_releases_the_execution_and_retries() {
    let harness = harness(fast_config());
    let mut tenant = demo_tenant();
    tenant.status = TenantStatus::Provisioning;
    tenant.workflow_execution_id = Some("exec-A".to_owned());
    let tenant = seed(&harness, tenant).await;

    let mut timed_out = WorkflowExecutionStatus::new("exec-A", ExecutionState::TimedOut);
    timed_out.error = Some(ExecutionError {
        message: "step deadline exceeded".to_owned(),
        kind: None,
        retryable: true,
    });
    harness.provider.script_status(timed_out).await;

    harness.reconciler.process_key(tenant.id).await;

    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Provisioning);
    assert!(stored.workflow_execution_id.is_none());
    assert_eq!(harness.queue.retries(tenant.id), 1);

    // Next pass triggers a fresh execution under the same name.
    harness.reconciler.process_key(tenant.id).await;
    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(stored.workflow_execution_id.is_some());
    assert_eq!(harness.queue.retries(tenant.id), 0);
}

#[tokio::test]
async fn missing_tenants_are_dropped_silently() {
    let harness = harness(fast_config());
    let unknown = TenantId::new();
    harness.reconciler.process_key(unknown).await;
    assert_eq!(harness.queue.retries(unknown), 0);
    assert!(harness.provider.invocations().await.is_empty());
}

#[tokio::test]
async fn run_drains_workers_on_shutdown() {
    let mut config = fast_config();
    config.workers = 2;
    let harness = harness(config);
    let tenant = seed(&harness, demo_tenant()).await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let runner = tokio::spawn(harness.reconciler.clone().run(shutdown_rx));

    // Give the enqueuer a couple of ticks to pick the tenant up.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ = shutdown_tx.send(true);
    let joined = tokio::time::timeout(Duration::from_secs(2), runner).await;
    assert!(joined.is_ok());

    let stored = harness
        .repository
        .get_by_id(tenant.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.status, TenantStatus::Provisioning);
}
