use landlord_core::{AppError, AppResult};
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// Prometheus instruments for the reconciliation core.
///
/// Metric names and semantics are fixed; the transport (scrape endpoint)
/// lives in the controller binary.
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Wall-clock seconds spent reconciling one tenant.
    pub reconciliation_duration: Histogram,
    /// Tenants currently waiting in the work queue.
    pub queue_depth: IntGauge,
    /// Retries consumed before one successful reconcile.
    pub retry_count: Histogram,
    /// Recorded status transitions, labeled by `from` and `to`.
    pub state_transition_count: IntCounterVec,
    /// Wall-clock seconds spent triggering one workflow.
    pub workflow_trigger_duration: Histogram,
    /// Failed workflow trigger calls.
    pub workflow_trigger_errors_total: IntCounter,
    /// Trigger calls the provider collapsed onto an existing execution.
    pub workflow_duplicates_prevented_total: IntCounter,
    /// Degraded workflows stopped and restarted after a config change.
    pub workflow_config_change_restarts_total: IntCounter,
}

impl ControllerMetrics {
    /// Creates unregistered instruments.
    pub fn new() -> AppResult<Self> {
        let reconciliation_duration = Histogram::with_opts(HistogramOpts::new(
            "reconciliation_duration_seconds",
            "Wall-clock seconds spent reconciling one tenant",
        ))
        .map_err(metric_error)?;
        let queue_depth = IntGauge::new(
            "queue_depth",
            "Tenants currently waiting in the work queue",
        )
        .map_err(metric_error)?;
        let retry_count = Histogram::with_opts(
            HistogramOpts::new(
                "retry_count",
                "Retries consumed before one successful reconcile",
            )
            .buckets(vec![0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0]),
        )
        .map_err(metric_error)?;
        let state_transition_count = IntCounterVec::new(
            Opts::new(
                "state_transition_count",
                "Recorded tenant status transitions",
            ),
            &["from", "to"],
        )
        .map_err(metric_error)?;
        let workflow_trigger_duration = Histogram::with_opts(HistogramOpts::new(
            "workflow_trigger_duration_seconds",
            "Wall-clock seconds spent triggering one workflow",
        ))
        .map_err(metric_error)?;
        let workflow_trigger_errors_total = IntCounter::new(
            "workflow_trigger_errors_total",
            "Failed workflow trigger calls",
        )
        .map_err(metric_error)?;
        let workflow_duplicates_prevented_total = IntCounter::new(
            "workflow_duplicates_prevented_total",
            "Trigger calls collapsed onto an existing execution",
        )
        .map_err(metric_error)?;
        let workflow_config_change_restarts_total = IntCounter::new(
            "workflow_config_change_restarts_total",
            "Degraded workflows stopped and restarted after a config change",
        )
        .map_err(metric_error)?;

        Ok(Self {
            reconciliation_duration,
            queue_depth,
            retry_count,
            state_transition_count,
            workflow_trigger_duration,
            workflow_trigger_errors_total,
            workflow_duplicates_prevented_total,
            workflow_config_change_restarts_total,
        })
    }

    /// Registers every instrument on the given registry.
    pub fn register_on(&self, registry: &Registry) -> AppResult<()> {
        registry
            .register(Box::new(self.reconciliation_duration.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.queue_depth.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.retry_count.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.state_transition_count.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.workflow_trigger_duration.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.workflow_trigger_errors_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.workflow_duplicates_prevented_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.workflow_config_change_restarts_total.clone()))
            .map_err(metric_error)?;
        Ok(())
    }

    /// Bumps the transition counter for one recorded status change.
    pub fn observe_transition(&self, from: &str, to: &str) {
        self.state_transition_count
            .with_label_values(&[from, to])
            .inc();
    }
}

fn metric_error(error: prometheus::Error) -> AppError {
    AppError::Internal(format!("failed to build controller metrics: {error}"))
}
