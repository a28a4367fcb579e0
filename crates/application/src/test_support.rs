//! Shared fakes for application service tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use landlord_core::{AppError, AppResult, TenantId};
use landlord_domain::{
    ExecutionState, StateTransition, Tenant, WorkflowExecutionStatus,
};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::tenant_ports::{TenantListQuery, TenantRepository};
use crate::workflow_ports::{
    InvokeWorkflowRequest, InvokeWorkflowResponse, WorkflowProvider, WorkflowSpec,
};

/// In-memory tenant repository with real optimistic-concurrency semantics.
#[derive(Default)]
pub struct FakeTenantRepository {
    tenants: Mutex<HashMap<TenantId, Tenant>>,
    transitions: Mutex<Vec<StateTransition>>,
    get_by_id_calls: Mutex<u32>,
    update_conflicts_remaining: Mutex<u32>,
}

impl FakeTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a tenant directly, bypassing create-time validation.
    pub async fn seed(&self, tenant: Tenant) -> Tenant {
        self.tenants.lock().await.insert(tenant.id, tenant.clone());
        tenant
    }

    pub async fn get_by_id_calls(&self) -> u32 {
        *self.get_by_id_calls.lock().await
    }

    /// Makes the next `count` updates fail with a version conflict.
    pub async fn inject_update_conflicts(&self, count: u32) {
        *self.update_conflicts_remaining.lock().await = count;
    }

    pub async fn transitions(&self) -> Vec<StateTransition> {
        self.transitions.lock().await.clone()
    }
}

#[async_trait]
impl TenantRepository for FakeTenantRepository {
    async fn create(&self, tenant: Tenant) -> AppResult<Tenant> {
        let mut tenants = self.tenants.lock().await;
        if tenants.values().any(|stored| stored.name == tenant.name) {
            return Err(AppError::AlreadyExists(format!(
                "tenant '{}' already exists",
                tenant.name
            )));
        }
        tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn get_by_id(&self, id: TenantId) -> AppResult<Tenant> {
        *self.get_by_id_calls.lock().await += 1;
        self.tenants
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("tenant '{id}' not found")))
    }

    async fn get_by_name(&self, name: &str) -> AppResult<Tenant> {
        self.tenants
            .lock()
            .await
            .values()
            .find(|tenant| tenant.name == name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("tenant '{name}' not found")))
    }

    async fn update_with_transition(
        &self,
        tenant: Tenant,
        transition: Option<StateTransition>,
    ) -> AppResult<Tenant> {
        {
            let mut conflicts = self.update_conflicts_remaining.lock().await;
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(AppError::VersionConflict(format!(
                    "tenant '{}' was updated concurrently",
                    tenant.id
                )));
            }
        }

        let mut tenants = self.tenants.lock().await;
        let stored = tenants
            .get_mut(&tenant.id)
            .ok_or_else(|| AppError::NotFound(format!("tenant '{}' not found", tenant.id)))?;
        if stored.version != tenant.version {
            return Err(AppError::VersionConflict(format!(
                "tenant '{}' version {} is stale (stored {})",
                tenant.id, tenant.version, stored.version
            )));
        }

        let mut updated = tenant;
        updated.created_at = stored.created_at;
        updated.updated_at = Utc::now();
        updated.version += 1;
        *stored = updated.clone();
        drop(tenants);

        if let Some(transition) = transition {
            self.transitions.lock().await.push(transition);
        }
        Ok(updated)
    }

    async fn list(&self, query: TenantListQuery) -> AppResult<Vec<Tenant>> {
        let tenants = self.tenants.lock().await;
        let mut rows: Vec<Tenant> = tenants
            .values()
            .filter(|tenant| matches_query(tenant, &query))
            .cloned()
            .collect();
        rows.sort_by(|left, right| right.created_at.cmp(&left.created_at));

        let rows = rows.into_iter().skip(query.offset);
        Ok(if query.limit > 0 {
            rows.take(query.limit).collect()
        } else {
            rows.collect()
        })
    }

    async fn list_for_reconciliation(&self) -> AppResult<Vec<Tenant>> {
        let tenants = self.tenants.lock().await;
        let mut rows: Vec<Tenant> = tenants
            .values()
            .filter(|tenant| !tenant.status.is_terminal())
            .cloned()
            .collect();
        rows.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(rows)
    }

    async fn delete(&self, id: TenantId) -> AppResult<()> {
        self.tenants
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("tenant '{id}' not found")))
    }

    async fn record_transition(&self, transition: StateTransition) -> AppResult<()> {
        self.transitions.lock().await.push(transition);
        Ok(())
    }

    async fn get_history(&self, tenant_id: TenantId) -> AppResult<Vec<StateTransition>> {
        let mut rows: Vec<StateTransition> = self
            .transitions
            .lock()
            .await
            .iter()
            .filter(|transition| transition.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(rows)
    }
}

fn matches_query(tenant: &Tenant, query: &TenantListQuery) -> bool {
    use landlord_domain::TenantStatus;

    if !query.statuses.is_empty() && !query.statuses.contains(&tenant.status) {
        return false;
    }
    if !query.include_deleted
        && query.statuses.is_empty()
        && matches!(tenant.status, TenantStatus::Deleting | TenantStatus::Archived)
    {
        return false;
    }
    if let Some(after) = query.created_after
        && tenant.created_at < after
    {
        return false;
    }
    if let Some(before) = query.created_before
        && tenant.created_at > before
    {
        return false;
    }
    if !query.sub_states.is_empty()
        && !tenant
            .workflow_sub_state
            .is_some_and(|sub_state| query.sub_states.contains(&sub_state))
    {
        return false;
    }
    if let Some(has_error) = query.has_workflow_error
        && tenant.workflow_error_message.is_some() != has_error
    {
        return false;
    }
    if let Some(min_retries) = query.min_retry_count
        && tenant.workflow_retry_count.unwrap_or(0) < min_retries
    {
        return false;
    }
    true
}

/// Scriptable in-memory workflow provider recording every call.
#[derive(Default)]
pub struct ScriptedWorkflowProvider {
    state: Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    executions_by_name: HashMap<String, String>,
    statuses: HashMap<String, WorkflowExecutionStatus>,
    invocations: Vec<InvokeWorkflowRequest>,
    stops: Vec<(String, String)>,
    invoke_failures_remaining: u32,
    status_failures_remaining: u32,
    stop_leaves_execution_running: bool,
    restart_counter: u32,
}

impl ScriptedWorkflowProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reported status of one execution.
    pub async fn script_status(&self, status: WorkflowExecutionStatus) {
        let mut state = self.state.lock().await;
        state
            .statuses
            .insert(status.execution_id.clone(), status);
    }

    /// Makes the next `count` invocations fail with a provider timeout.
    pub async fn fail_invocations(&self, count: u32) {
        self.state.lock().await.invoke_failures_remaining = count;
    }

    /// Makes the next `count` status polls fail with a provider timeout.
    pub async fn fail_status_polls(&self, count: u32) {
        self.state.lock().await.status_failures_remaining = count;
    }

    /// Keeps executions running after a stop request, forcing stop-poll
    /// timeouts.
    pub async fn ignore_stop_requests(&self) {
        self.state.lock().await.stop_leaves_execution_running = true;
    }

    pub async fn invocations(&self) -> Vec<InvokeWorkflowRequest> {
        self.state.lock().await.invocations.clone()
    }

    pub async fn stops(&self) -> Vec<(String, String)> {
        self.state.lock().await.stops.clone()
    }
}

#[async_trait]
impl WorkflowProvider for ScriptedWorkflowProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        _workflow_id: &str,
        request: InvokeWorkflowRequest,
    ) -> AppResult<InvokeWorkflowResponse> {
        let mut state = self.state.lock().await;
        if state.invoke_failures_remaining > 0 {
            state.invoke_failures_remaining -= 1;
            return Err(AppError::ProviderTimeout(
                "scripted invoke failure".to_owned(),
            ));
        }

        state.invocations.push(request.clone());

        if let Some(execution_id) = state.executions_by_name.get(&request.execution_name).cloned()
            && state
                .statuses
                .get(&execution_id)
                .is_some_and(|status| !status.state.is_terminal())
        {
            let started_at = state
                .statuses
                .get(&execution_id)
                .map(|status| status.start_time)
                .unwrap_or_else(Utc::now);
            let response_state = state
                .statuses
                .get(&execution_id)
                .map(|status| status.state)
                .unwrap_or(ExecutionState::Running);
            return Ok(InvokeWorkflowResponse {
                execution_id,
                state: response_state,
                started_at,
                deduplicated: true,
            });
        }

        // First execution for a name reuses the name as its id; restarts get
        // a suffixed id so stop-and-restart produces a distinct handle.
        let execution_id = if state.executions_by_name.contains_key(&request.execution_name) {
            state.restart_counter += 1;
            format!("{}-{}", request.execution_name, state.restart_counter)
        } else {
            request.execution_name.clone()
        };
        state
            .executions_by_name
            .insert(request.execution_name.clone(), execution_id.clone());
        let status = WorkflowExecutionStatus::new(execution_id.clone(), ExecutionState::Running);
        let started_at = status.start_time;
        state.statuses.insert(execution_id.clone(), status);

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
        if state.status_failures_remaining > 0 {
            state.status_failures_remaining -= 1;
            return Err(AppError::ProviderTimeout(
                "scripted status failure".to_owned(),
            ));
        }

        state
            .statuses
            .get(execution_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("execution '{execution_id}' not found")))
    }

    async fn stop_execution(&self, execution_id: &str, reason: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state
            .stops
            .push((execution_id.to_owned(), reason.to_owned()));
        if !state.stop_leaves_execution_running
            && let Some(status) = state.statuses.get_mut(execution_id)
        {
            status.state = ExecutionState::Cancelled;
            status.stop_time = Some(Utc::now());
        }
        Ok(())
    }

    async fn delete_workflow(&self, _workflow_id: &str) -> AppResult<()> {
        Ok(())
    }

    async fn validate(&self, _spec: &WorkflowSpec) -> AppResult<()> {
        Ok(())
    }

    async fn post_compute_callback(
        &self,
        _execution_id: &str,
        _payload: Value,
    ) -> AppResult<()> {
        Ok(())
    }
}
