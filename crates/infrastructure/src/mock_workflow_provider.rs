use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use landlord_application::{
    InvokeWorkflowRequest, InvokeWorkflowResponse, WorkflowProvider, WorkflowSpec,
};
use landlord_core::{AppError, AppResult};
use landlord_domain::{ExecutionError, ExecutionState, WorkflowExecutionStatus};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory workflow provider for tests and local runs.
///
/// Invocations are idempotent by execution name. By default executions
/// report `running` for a configurable number of status polls and then
/// succeed, so a locally-run controller drives tenants to `ready` without
/// an external orchestrator.
pub struct MockWorkflowProvider {
    state: Mutex<MockState>,
    auto_succeed_after_polls: Option<u32>,
}

#[derive(Default)]
struct MockState {
    executions_by_name: HashMap<String, String>,
    executions: HashMap<String, MockExecution>,
    restart_counter: u64,
}

struct MockExecution {
    status: WorkflowExecutionStatus,
    polls: u32,
}

impl Default for MockWorkflowProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorkflowProvider {
    /// Creates a provider whose executions succeed after two status polls.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            auto_succeed_after_polls: Some(2),
        }
    }

    /// Creates a provider whose executions only finish via
    /// [`Self::complete_execution`] or [`Self::fail_execution`].
    #[must_use]
    pub fn with_manual_completion() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            auto_succeed_after_polls: None,
        }
    }

    /// Marks one execution as succeeded with the given output.
    pub async fn complete_execution(&self, execution_id: &str, output: Value) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| AppError::NotFound(format!("execution '{execution_id}' not found")))?;
        execution.status.state = ExecutionState::Succeeded;
        execution.status.stop_time = Some(Utc::now());
        execution.status.output = output;
        Ok(())
    }

    /// Marks one execution as failed.
    pub async fn fail_execution(
        &self,
        execution_id: &str,
        message: &str,
        retryable: bool,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| AppError::NotFound(format!("execution '{execution_id}' not found")))?;
        execution.status.state = ExecutionState::Failed;
        execution.status.stop_time = Some(Utc::now());
        execution.status.error = Some(ExecutionError {
            message: message.to_owned(),
            kind: None,
            retryable,
        });
        Ok(())
    }

    /// Sets one metadata key on an execution status.
    pub async fn set_execution_metadata(
        &self,
        execution_id: &str,
        key: &str,
        value: &str,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| AppError::NotFound(format!("execution '{execution_id}' not found")))?;
        execution
            .status
            .metadata
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[async_trait]
impl WorkflowProvider for MockWorkflowProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(
        &self,
        workflow_id: &str,
        request: InvokeWorkflowRequest,
    ) -> AppResult<InvokeWorkflowResponse> {
        let mut state = self.state.lock().await;

        if let Some(execution_id) = state
            .executions_by_name
            .get(&request.execution_name)
            .cloned()
            && let Some(existing) = state.executions.get(&execution_id)
            && !existing.status.state.is_terminal()
        {
            debug!(
                execution_name = %request.execution_name,
                execution_id = %execution_id,
                "collapsing duplicate invocation onto running execution"
            );
            return Ok(InvokeWorkflowResponse {
                execution_id,
                state: existing.status.state,
                started_at: existing.status.start_time,
                deduplicated: true,
            });
        }

        let execution_id = if state.executions_by_name.contains_key(&request.execution_name) {
            state.restart_counter += 1;
            format!("{}-{}", request.execution_name, state.restart_counter)
        } else {
            request.execution_name.clone()
        };

        let mut status =
            WorkflowExecutionStatus::new(execution_id.clone(), ExecutionState::Running);
        status.input = serde_json::json!({
            "workflow_id": workflow_id,
            "tenant_id": request.tenant_id,
            "operation": request.operation,
            "desired_image": request.desired_image,
            "desired_config": request.desired_config,
            "compute_provider": request.compute_provider,
            "metadata": request.metadata,
        });
        status
            .metadata
            .extend(request.metadata.iter().map(|(key, value)| {
                (key.clone(), value.clone())
            }));
        let started_at = status.start_time;

        state
            .executions_by_name
            .insert(request.execution_name.clone(), execution_id.clone());
        state
            .executions
            .insert(execution_id.clone(), MockExecution { status, polls: 0 });

        Ok(InvokeWorkflowResponse {
            execution_id,
            state: ExecutionState::Running,
            started_at,
            deduplicated: false,
        })
    }

    async fn get_execution_status(
        &self,
        execution_id: &str,
    ) -> AppResult<WorkflowExecutionStatus> {
        let mut state = self.state.lock().await;
        let auto_succeed = self.auto_succeed_after_polls;
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| AppError::NotFound(format!("execution '{execution_id}' not found")))?;

        execution.polls += 1;
        if let Some(threshold) = auto_succeed
            && !execution.status.state.is_terminal()
            && execution.polls >= threshold
        {
            execution.status.state = ExecutionState::Succeeded;
            execution.status.stop_time = Some(Utc::now());
        }

        Ok(execution.status.clone())
    }

    async fn stop_execution(&self, execution_id: &str, reason: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| AppError::NotFound(format!("execution '{execution_id}' not found")))?;
        if !execution.status.state.is_terminal() {
            execution.status.state = ExecutionState::Cancelled;
            execution.status.stop_time = Some(Utc::now());
            execution
                .status
                .metadata
                .insert("stop_reason".to_owned(), reason.to_owned());
        }
        Ok(())
    }

    async fn delete_workflow(&self, workflow_id: &str) -> AppResult<()> {
        debug!(workflow_id = %workflow_id, "mock provider ignoring workflow deletion");
        Ok(())
    }

    async fn validate(&self, _spec: &WorkflowSpec) -> AppResult<()> {
        Ok(())
    }

    async fn post_compute_callback(&self, execution_id: &str, _payload: Value) -> AppResult<()> {
        debug!(execution_id = %execution_id, "mock provider ignoring compute callback");
        Ok(())
    }
}
