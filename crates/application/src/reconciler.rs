//! Polling controller driving tenants toward their desired state.

use std::sync::Arc;
use std::time::Duration;

use landlord_core::TenantId;
use landlord_domain::{StateTransition, TenantStatus, TriggerSource, validate_transition};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::metrics::ControllerMetrics;
use crate::tenant_ports::TenantRepository;
use crate::work_queue::RateLimitedQueue;
use crate::workflow_client::WorkflowClient;

mod reconcile;

#[cfg(test)]
mod tests;

/// Reconciler tuning knobs.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Sleep between enqueuer scans.
    pub reconciliation_interval: Duration,
    /// Concurrent reconcile workers.
    pub workers: usize,
    /// Per-call deadline for workflow provider calls.
    pub workflow_trigger_timeout: Duration,
    /// Grace period for in-flight workers on shutdown.
    pub shutdown_timeout: Duration,
    /// Retryable attempt cap before a tenant is failed.
    pub max_retries: u32,
    /// Sleep between stop-confirmation polls.
    pub stop_poll_interval: Duration,
    /// Total budget for confirming a stopped execution.
    pub stop_poll_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            reconciliation_interval: Duration::from_secs(10),
            workers: 3,
            workflow_trigger_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_retries: 5,
            stop_poll_interval: Duration::from_secs(1),
            stop_poll_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of one per-tenant reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcileOutcome {
    /// Nothing left to do this pass; reset the retry counter.
    Settled,
    /// Workflow healthy in flight; re-poll on the next enqueuer tick
    /// without resetting the retry counter.
    InFlight,
}

/// Periodic enqueuer plus worker pool over the rate-limited work queue.
pub struct Reconciler {
    repository: Arc<dyn TenantRepository>,
    workflow_client: Arc<WorkflowClient>,
    queue: RateLimitedQueue,
    metrics: Arc<ControllerMetrics>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Creates a reconciler over the given collaborators.
    #[must_use]
    pub fn new(
        repository: Arc<dyn TenantRepository>,
        workflow_client: Arc<WorkflowClient>,
        queue: RateLimitedQueue,
        metrics: Arc<ControllerMetrics>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            repository,
            workflow_client,
            queue,
            metrics,
            config,
        }
    }

    /// Runs the enqueuer and worker pool until the shutdown signal flips.
    ///
    /// In-flight reconciles get `shutdown_timeout` to drain before being
    /// abandoned.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!(
            workers = self.config.workers,
            interval_seconds = self.config.reconciliation_interval.as_secs(),
            max_retries = self.config.max_retries,
            "reconciler started"
        );

        let mut tasks = JoinSet::new();
        {
            let reconciler = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tasks.spawn(async move { reconciler.run_enqueuer(shutdown).await });
        }
        for worker_index in 0..self.config.workers.max(1) {
            let reconciler = Arc::clone(&self);
            tasks.spawn(async move { reconciler.run_worker(worker_index).await });
        }

        let mut shutdown = shutdown;
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("reconciler shutting down");
        self.queue.shut_down();

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                grace_seconds = self.config.shutdown_timeout.as_secs(),
                "shutdown grace elapsed; abandoning in-flight reconciles"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        info!("reconciler stopped");
    }

    async fn run_enqueuer(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconciliation_interval) => {
                    self.scan_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Lists non-terminal tenants and enqueues them; the queue's dedup
    /// absorbs overlap with still-processing items and earlier scans.
    async fn scan_once(&self) {
        match self.repository.list_for_reconciliation().await {
            Ok(tenants) => {
                let scanned = tenants.len();
                for tenant in tenants {
                    self.queue.add(tenant.id);
                }
                self.metrics.queue_depth.set(queue_depth(&self.queue));
                debug!(scanned, "reconciliation scan enqueued work");
            }
            Err(error) => {
                warn!(error = %error, "reconciliation scan failed; will retry next tick");
            }
        }
    }

    async fn run_worker(&self, worker_index: usize) {
        debug!(worker = worker_index, "reconciler worker started");
        while let Some(key) = self.queue.get().await {
            self.process_key(key).await;
            self.metrics.queue_depth.set(queue_depth(&self.queue));
        }
        debug!(worker = worker_index, "reconciler worker stopped");
    }

    /// Runs one reconcile pass and classifies the outcome against the
    /// queue: success resets the retry counter, retryable errors requeue
    /// with backoff until the attempt cap, fatal errors fail the tenant.
    async fn process_key(&self, key: TenantId) {
        let timer = self.metrics.reconciliation_duration.start_timer();
        let outcome = self.reconcile_tenant(key).await;
        timer.observe_duration();

        match outcome {
            Ok(ReconcileOutcome::Settled) => {
                self.metrics
                    .retry_count
                    .observe(f64::from(self.queue.retries(key)));
                self.queue.forget(key);
                self.queue.done(key);
            }
            Ok(ReconcileOutcome::InFlight) => {
                self.queue.done(key);
            }
            Err(error) if error.is_retryable() => {
                let attempts = self.queue.retries(key);
                if attempts >= self.config.max_retries {
                    error!(
                        tenant_id = %key,
                        attempts,
                        error = %error,
                        "retry budget exhausted; failing tenant"
                    );
                    self.fail_tenant(
                        key,
                        format!(
                            "reconciliation retries exhausted after {attempts} attempts: {error}"
                        ),
                    )
                    .await;
                    self.queue.forget(key);
                    self.queue.done(key);
                } else {
                    warn!(
                        tenant_id = %key,
                        attempts,
                        error = %error,
                        "reconciliation failed; requeuing with backoff"
                    );
                    self.queue.add_rate_limited(key);
                    self.queue.done(key);
                }
            }
            Err(error) => {
                error!(tenant_id = %key, error = %error, "fatal reconciliation error; failing tenant");
                self.fail_tenant(key, error.to_string()).await;
                self.queue.forget(key);
                self.queue.done(key);
            }
        }
    }

    /// Moves a tenant to `failed`, keeping `workflow_execution_id` for
    /// audit.
    async fn fail_tenant(&self, key: TenantId, message: String) {
        let mut tenant = match self.repository.get_by_id(key).await {
            Ok(tenant) => tenant,
            Err(error) => {
                warn!(tenant_id = %key, error = %error, "cannot load tenant for terminal failure");
                return;
            }
        };
        if tenant.status.is_terminal() {
            return;
        }

        let from_status = tenant.status;
        if let Err(error) = validate_transition(from_status, TenantStatus::Failed) {
            warn!(tenant_id = %key, error = %error, "cannot fail tenant from current status");
            return;
        }

        tenant.status = TenantStatus::Failed;
        tenant.status_message = message.clone();
        tenant.workflow_error_message = Some(message.clone());

        let transition = StateTransition::record(
            &tenant,
            from_status,
            TenantStatus::Failed,
            message,
            TriggerSource::Controller,
        );
        match self
            .repository
            .update_with_transition(tenant, Some(transition))
            .await
        {
            Ok(_) => {
                self.metrics
                    .observe_transition(from_status.as_str(), TenantStatus::Failed.as_str());
            }
            Err(error) => {
                warn!(tenant_id = %key, error = %error, "failed to persist terminal failure");
            }
        }
    }
}

fn queue_depth(queue: &RateLimitedQueue) -> i64 {
    i64::try_from(queue.len()).unwrap_or(i64::MAX)
}
