use std::collections::HashMap;
use std::sync::Arc;

use landlord_core::AppResult;
use landlord_domain::{
    ReconcileAction, Tenant, TenantStatus, TriggerSource, WorkflowExecutionStatus,
    action_for_status, execution_name,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::compute_resolver::ComputeProviderResolver;
use crate::metrics::ControllerMetrics;
use crate::workflow_ports::{InvokeWorkflowRequest, WorkflowProviderRegistry};

/// Per-tenant workflow coordination facade used by the reconciler.
///
/// Triggers are idempotent end to end: execution names are deterministic
/// per `(tenant, action)` and the provider collapses duplicates.
pub struct WorkflowClient {
    registry: Arc<WorkflowProviderRegistry>,
    provider_name: String,
    workflow_id: String,
    resolver: Arc<ComputeProviderResolver>,
    metrics: Arc<ControllerMetrics>,
}

impl WorkflowClient {
    /// Creates a client bound to one registered provider.
    #[must_use]
    pub fn new(
        registry: Arc<WorkflowProviderRegistry>,
        provider_name: impl Into<String>,
        workflow_id: impl Into<String>,
        resolver: Arc<ComputeProviderResolver>,
        metrics: Arc<ControllerMetrics>,
    ) -> Self {
        Self {
            registry,
            provider_name: provider_name.into(),
            workflow_id: workflow_id.into(),
            resolver,
            metrics,
        }
    }

    /// Returns the action required to progress a tenant, or `None` for
    /// statuses that are terminal for reconciliation purposes.
    #[must_use]
    pub fn determine_action(&self, status: TenantStatus) -> Option<ReconcileAction> {
        action_for_status(status)
    }

    /// Triggers the workflow for one tenant action and returns the
    /// execution handle.
    pub async fn trigger_workflow(
        &self,
        tenant: &Tenant,
        action: ReconcileAction,
        source: TriggerSource,
    ) -> AppResult<String> {
        let provider = self.registry.get(self.provider_name.as_str())?;
        let execution_name = execution_name(tenant.id, action);
        let compute_provider = self.resolver.resolve(tenant.id).await?;

        let mut metadata = HashMap::new();
        metadata.insert("config_hash".to_owned(), tenant.desired_config_hash());
        metadata.insert("trigger_source".to_owned(), source.as_str().to_owned());

        let request = InvokeWorkflowRequest {
            execution_name: execution_name.clone(),
            tenant_id: tenant.id,
            operation: action.as_str().to_owned(),
            desired_image: tenant.desired_image.clone(),
            desired_config: Value::Object(tenant.desired_config.clone()),
            compute_provider,
            metadata,
        };

        let timer = self.metrics.workflow_trigger_duration.start_timer();
        let response = provider.invoke(self.workflow_id.as_str(), request).await;
        timer.observe_duration();

        let response = response.inspect_err(|_| {
            self.metrics.workflow_trigger_errors_total.inc();
        })?;

        if response.deduplicated {
            self.metrics.workflow_duplicates_prevented_total.inc();
            debug!(
                tenant_id = %tenant.id,
                execution_name = %execution_name,
                execution_id = %response.execution_id,
                "workflow trigger collapsed onto existing execution"
            );
        } else {
            info!(
                tenant_id = %tenant.id,
                action = %action,
                execution_id = %response.execution_id,
                trigger_source = %source,
                "workflow triggered"
            );
        }

        Ok(response.execution_id)
    }

    /// Returns the provider-reported status of one execution.
    pub async fn get_execution_status(
        &self,
        execution_id: &str,
    ) -> AppResult<WorkflowExecutionStatus> {
        let provider = self.registry.get(self.provider_name.as_str())?;
        provider.get_execution_status(execution_id).await
    }

    /// Requests the provider to stop one execution.
    pub async fn stop_execution(
        &self,
        tenant: &Tenant,
        execution_id: &str,
        reason: &str,
    ) -> AppResult<()> {
        info!(
            tenant_id = %tenant.id,
            execution_id = %execution_id,
            reason = %reason,
            "stopping workflow execution"
        );
        let provider = self.registry.get(self.provider_name.as_str())?;
        provider.stop_execution(execution_id, reason).await
    }
}
