//! The per-tenant reconcile protocol.

use std::future::Future;

use landlord_core::{AppError, AppResult, TenantId};
use landlord_domain::{
    DerivedSubState, ReconcileAction, StateTransition, Tenant, TenantStatus, TriggerSource,
    WorkflowExecutionStatus, WorkflowSubState, action_for_status, derive_sub_state,
    status_for_action, success_status, validate_transition,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ReconcileOutcome, Reconciler};

impl Reconciler {
    /// Runs the per-tenant protocol: fetch, skip terminal, observe or
    /// trigger the workflow, and detect degraded executions whose desired
    /// config changed.
    pub(super) async fn reconcile_tenant(&self, key: TenantId) -> AppResult<ReconcileOutcome> {
        let tenant = match self.repository.get_by_id(key).await {
            Ok(tenant) => tenant,
            Err(AppError::NotFound(_)) => {
                debug!(tenant_id = %key, "tenant disappeared; dropping from queue");
                return Ok(ReconcileOutcome::Settled);
            }
            Err(error) => return Err(error),
        };

        if tenant.status.is_terminal() {
            return Ok(ReconcileOutcome::Settled);
        }

        let Some(action) = action_for_status(tenant.status) else {
            return Ok(ReconcileOutcome::Settled);
        };

        match tenant.workflow_execution_id.clone() {
            Some(execution_id) => self.observe_execution(tenant, action, execution_id).await,
            None => {
                self.trigger(tenant, action, TriggerSource::Controller)
                    .await?;
                Ok(ReconcileOutcome::Settled)
            }
        }
    }

    /// Polls the active execution, persists its derived liveness, and
    /// settles terminal outcomes or restarts degraded executions.
    async fn observe_execution(
        &self,
        mut tenant: Tenant,
        action: ReconcileAction,
        execution_id: String,
    ) -> AppResult<ReconcileOutcome> {
        let execution = self
            .with_provider_timeout(
                "execution status poll",
                self.workflow_client
                    .get_execution_status(execution_id.as_str()),
            )
            .await?;
        let derived = derive_sub_state(&execution);

        if execution.state.is_terminal() {
            return self
                .settle_terminal_execution(tenant, action, &execution, derived)
                .await;
        }

        let liveness_changed = tenant.workflow_sub_state != Some(derived.sub_state)
            || tenant.workflow_retry_count != derived.retry_count
            || tenant.workflow_error_message != derived.error_message;
        if liveness_changed {
            tenant.workflow_sub_state = Some(derived.sub_state);
            tenant.workflow_retry_count = derived.retry_count;
            tenant.workflow_error_message = derived.error_message.clone();
            tenant = self.repository.update(tenant).await?;
        }

        let current_hash = tenant.desired_config_hash();
        let hash_matches = tenant.workflow_config_hash.as_deref() == Some(current_hash.as_str());
        if derived.sub_state == WorkflowSubState::BackingOff && !hash_matches {
            self.restart_for_config_change(tenant, action, execution_id, current_hash)
                .await?;
            return Ok(ReconcileOutcome::Settled);
        }

        Ok(ReconcileOutcome::InFlight)
    }

    /// Advances the tenant after its execution finished: success moves it
    /// along the lifecycle, a non-retryable failure fails it, and any
    /// other failure clears the execution and retries with backoff.
    async fn settle_terminal_execution(
        &self,
        mut tenant: Tenant,
        action: ReconcileAction,
        execution: &WorkflowExecutionStatus,
        derived: DerivedSubState,
    ) -> AppResult<ReconcileOutcome> {
        let from_status = tenant.status;

        if execution.state.is_success() {
            let Some(next_status) = success_status(from_status) else {
                warn!(
                    tenant_id = %tenant.id,
                    status = %from_status,
                    execution_id = %execution.execution_id,
                    "succeeded execution has no successor status; clearing stale handle"
                );
                tenant.clear_workflow_tracking();
                self.repository.update(tenant).await?;
                return Ok(ReconcileOutcome::Settled);
            };
            validate_transition(from_status, next_status)?;

            apply_observed_output(&mut tenant, &execution.output);
            tenant.status = next_status;
            tenant.status_message = format!("{action} workflow succeeded");
            tenant.clear_workflow_tracking();

            let transition = StateTransition::record(
                &tenant,
                from_status,
                next_status,
                format!("{action} workflow succeeded"),
                TriggerSource::Controller,
            );
            self.repository
                .update_with_transition(tenant, Some(transition))
                .await?;
            self.metrics
                .observe_transition(from_status.as_str(), next_status.as_str());
            info!(
                execution_id = %execution.execution_id,
                from = %from_status,
                to = %next_status,
                "workflow succeeded"
            );
            return Ok(ReconcileOutcome::Settled);
        }

        let message = derived.error_message.clone().unwrap_or_else(|| {
            format!(
                "{action} workflow finished in state '{}'",
                execution.state
            )
        });

        let non_retryable = execution
            .error
            .as_ref()
            .is_some_and(|error| !error.retryable);
        if non_retryable {
            validate_transition(from_status, TenantStatus::Failed)?;
            tenant.status = TenantStatus::Failed;
            tenant.status_message = message.clone();
            tenant.workflow_error_message = Some(message.clone());
            tenant.workflow_sub_state = Some(derived.sub_state);
            tenant.workflow_retry_count = derived.retry_count;

            let transition = StateTransition::record(
                &tenant,
                from_status,
                TenantStatus::Failed,
                message.clone(),
                TriggerSource::Controller,
            );
            self.repository
                .update_with_transition(tenant, Some(transition))
                .await?;
            self.metrics
                .observe_transition(from_status.as_str(), "failed");
            warn!(
                execution_id = %execution.execution_id,
                error = %message,
                "workflow rejected as non-retryable; tenant failed"
            );
            return Ok(ReconcileOutcome::Settled);
        }

        // Transient workflow failure: release the execution handle so the
        // next attempt triggers a fresh execution, then retry with backoff.
        tenant.status_message = message.clone();
        tenant.clear_workflow_tracking();
        self.repository.update(tenant).await?;
        Err(AppError::Internal(format!(
            "workflow execution '{}' ended in state '{}': {message}",
            execution.execution_id, execution.state
        )))
    }

    /// Triggers the workflow for an action and persists the new execution
    /// handle, config hash, and status transition.
    async fn trigger(
        &self,
        mut tenant: Tenant,
        action: ReconcileAction,
        source: TriggerSource,
    ) -> AppResult<Tenant> {
        let from_status = tenant.status;
        let next_status = status_for_action(action, from_status)?;

        let execution_id = self
            .with_provider_timeout(
                "workflow trigger",
                self.workflow_client.trigger_workflow(&tenant, action, source),
            )
            .await?;

        tenant.workflow_execution_id = Some(execution_id.clone());
        tenant.workflow_config_hash = Some(tenant.desired_config_hash());
        tenant.workflow_sub_state = None;
        tenant.workflow_retry_count = None;
        tenant.workflow_error_message = None;
        tenant.status = next_status;
        tenant.status_message = format!("{action} workflow triggered");

        let transition = (from_status != next_status).then(|| {
            StateTransition::record(
                &tenant,
                from_status,
                next_status,
                format!("{action} workflow triggered"),
                source,
            )
        });
        let recorded = transition.is_some();

        let tenant = self
            .repository
            .update_with_transition(tenant, transition)
            .await?;
        if recorded {
            self.metrics
                .observe_transition(from_status.as_str(), next_status.as_str());
        }
        Ok(tenant)
    }

    /// Stops a degraded execution whose desired config changed, waits for
    /// it to reach a terminal state, then triggers a replacement.
    async fn restart_for_config_change(
        &self,
        mut tenant: Tenant,
        action: ReconcileAction,
        old_execution_id: String,
        new_hash: String,
    ) -> AppResult<()> {
        let old_hash = tenant.workflow_config_hash.clone().unwrap_or_default();

        self.with_provider_timeout(
            "stop execution",
            self.workflow_client
                .stop_execution(&tenant, old_execution_id.as_str(), "Configuration updated"),
        )
        .await?;
        self.await_execution_stopped(old_execution_id.as_str())
            .await?;

        tenant.workflow_execution_id = None;
        tenant.workflow_error_message = None;
        tenant.workflow_retry_count = None;
        let tenant = self.repository.update(tenant).await?;

        let tenant = self
            .trigger(tenant, action, TriggerSource::ControllerConfigChange)
            .await?;
        self.metrics.workflow_config_change_restarts_total.inc();
        info!(
            tenant_id = %tenant.id,
            old_hash = %old_hash,
            new_hash = %new_hash,
            old_execution_id = %old_execution_id,
            new_execution_id = tenant.workflow_execution_id.as_deref().unwrap_or_default(),
            trigger_source = %TriggerSource::ControllerConfigChange,
            "restarted degraded workflow after config change"
        );
        Ok(())
    }

    /// Polls until the execution reports a terminal state, failing with a
    /// retryable stop timeout once the budget elapses.
    async fn await_execution_stopped(&self, execution_id: &str) -> AppResult<()> {
        let deadline = tokio::time::Instant::now() + self.config.stop_poll_timeout;
        loop {
            let execution = self
                .workflow_client
                .get_execution_status(execution_id)
                .await?;
            if execution.state.is_terminal() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::StopTimeout(format!(
                    "execution '{execution_id}' did not stop within {}s",
                    self.config.stop_poll_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.config.stop_poll_interval).await;
        }
    }

    async fn with_provider_timeout<T>(
        &self,
        operation: &str,
        call: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.config.workflow_trigger_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::ProviderTimeout(format!(
                "{operation} exceeded {}s",
                self.config.workflow_trigger_timeout.as_secs()
            ))),
        }
    }
}

/// Records observed state reported by a finished workflow, when present.
fn apply_observed_output(tenant: &mut Tenant, output: &Value) {
    let Some(output) = output.as_object() else {
        return;
    };

    if let Some(image) = output.get("image").and_then(Value::as_str) {
        tenant.observed_image = image.to_owned();
    }
    if let Some(config) = output.get("config").and_then(Value::as_object) {
        tenant.observed_config = string_map(config);
    }
    if let Some(resource_ids) = output.get("resource_ids").and_then(Value::as_object) {
        tenant.observed_resource_ids = string_map(resource_ids);
    }
}

fn string_map(map: &serde_json::Map<String, Value>) -> std::collections::HashMap<String, String> {
    map.iter()
        .filter_map(|(key, value)| {
            value
                .as_str()
                .map(|value| (key.clone(), value.to_owned()))
        })
        .collect()
}
