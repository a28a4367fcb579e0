use async_trait::async_trait;
use landlord_core::AppResult;
use landlord_domain::WorkflowExecutionStatus;
use serde_json::Value;

use super::request::{InvokeWorkflowRequest, InvokeWorkflowResponse};

/// Declarative workflow definition validated against a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSpec {
    /// Provider-side workflow identifier.
    pub workflow_id: String,
    /// Provider-specific workflow definition payload.
    pub definition: Value,
}

/// Port over an external workflow orchestrator.
///
/// Implementations must make `invoke` idempotent by
/// `request.execution_name`: invoking the same name again returns the
/// already-running execution instead of starting a duplicate.
#[async_trait]
pub trait WorkflowProvider: Send + Sync {
    /// Returns the registry name of this provider.
    fn name(&self) -> &str;

    /// Starts (or joins) one workflow execution.
    async fn invoke(
        &self,
        workflow_id: &str,
        request: InvokeWorkflowRequest,
    ) -> AppResult<InvokeWorkflowResponse>;

    /// Returns the current status of one execution.
    ///
    /// Safe to call concurrently for the same execution.
    async fn get_execution_status(&self, execution_id: &str)
    -> AppResult<WorkflowExecutionStatus>;

    /// Requests one execution to stop.
    ///
    /// May complete asynchronously; a subsequent `get_execution_status`
    /// must eventually report a terminal state.
    async fn stop_execution(&self, execution_id: &str, reason: &str) -> AppResult<()>;

    /// Removes one workflow definition from the orchestrator.
    async fn delete_workflow(&self, workflow_id: &str) -> AppResult<()>;

    /// Validates a workflow definition without registering it.
    async fn validate(&self, spec: &WorkflowSpec) -> AppResult<()>;

    /// Forwards a compute-provider callback payload to one execution.
    async fn post_compute_callback(&self, execution_id: &str, payload: Value) -> AppResult<()>;
}
