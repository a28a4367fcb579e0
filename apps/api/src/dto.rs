use std::collections::HashMap;

use landlord_application::{CreateTenantInput, TenantListQuery, UpdateTenantInput};
use landlord_core::{AppError, AppResult};
use landlord_domain::{StateTransition, Tenant, TenantStatus, WorkflowSubState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tenant creation request body.
#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub desired_image: String,
    #[serde(default)]
    pub desired_config: Map<String, Value>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl From<CreateTenantRequest> for CreateTenantInput {
    fn from(value: CreateTenantRequest) -> Self {
        Self {
            name: value.name,
            desired_image: value.desired_image,
            desired_config: value.desired_config,
            labels: value.labels,
            annotations: value.annotations,
        }
    }
}

/// Desired-state update request body.
#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    #[serde(default)]
    pub desired_image: Option<String>,
    #[serde(default)]
    pub desired_config: Option<Map<String, Value>>,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default)]
    pub annotations: Option<HashMap<String, String>>,
}

impl From<UpdateTenantRequest> for UpdateTenantInput {
    fn from(value: UpdateTenantRequest) -> Self {
        Self {
            desired_image: value.desired_image,
            desired_config: value.desired_config,
            labels: value.labels,
            annotations: value.annotations,
        }
    }
}

/// Tenant listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct TenantListParams {
    /// Comma-separated lifecycle statuses.
    #[serde(default)]
    pub status: Option<String>,
    /// Comma-separated workflow sub-states.
    #[serde(default)]
    pub sub_state: Option<String>,
    #[serde(default)]
    pub has_workflow_error: Option<bool>,
    #[serde(default)]
    pub min_retry_count: Option<u32>,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl TenantListParams {
    /// Converts the query parameters into a repository listing query.
    pub fn into_query(self) -> AppResult<TenantListQuery> {
        let statuses = parse_csv(self.status.as_deref(), TenantStatus::parse)?;
        let sub_states = parse_csv(self.sub_state.as_deref(), WorkflowSubState::parse)?;

        let limit = self.limit.unwrap_or(50);
        if limit > 500 {
            return Err(AppError::Validation(
                "limit must not exceed 500".to_owned(),
            ));
        }

        Ok(TenantListQuery {
            statuses,
            created_after: None,
            created_before: None,
            sub_states,
            has_workflow_error: self.has_workflow_error,
            min_retry_count: self.min_retry_count,
            include_deleted: self.include_deleted,
            limit,
            offset: self.offset.unwrap_or(0),
        })
    }
}

fn parse_csv<T>(raw: Option<&str>, parse: impl Fn(&str) -> AppResult<T>) -> AppResult<Vec<T>> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(&parse)
            .collect()
    })
    .unwrap_or_else(|| Ok(Vec::new()))
}

/// Tenant response body.
#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub id: String,
    pub name: String,
    pub status: String,
    pub status_message: String,
    pub desired_image: String,
    pub desired_config: Map<String, Value>,
    pub observed_image: String,
    pub observed_config: HashMap<String, String>,
    pub observed_resource_ids: HashMap<String, String>,
    pub workflow_execution_id: Option<String>,
    pub workflow_sub_state: Option<String>,
    pub workflow_retry_count: Option<u32>,
    pub workflow_error_message: Option<String>,
    pub workflow_config_hash: Option<String>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub version: i64,
}

impl From<Tenant> for TenantResponse {
    fn from(tenant: Tenant) -> Self {
        Self {
            id: tenant.id.to_string(),
            name: tenant.name,
            status: tenant.status.as_str().to_owned(),
            status_message: tenant.status_message,
            desired_image: tenant.desired_image,
            desired_config: tenant.desired_config,
            observed_image: tenant.observed_image,
            observed_config: tenant.observed_config,
            observed_resource_ids: tenant.observed_resource_ids,
            workflow_execution_id: tenant.workflow_execution_id,
            workflow_sub_state: tenant
                .workflow_sub_state
                .map(|sub_state| sub_state.as_str().to_owned()),
            workflow_retry_count: tenant.workflow_retry_count,
            workflow_error_message: tenant.workflow_error_message,
            workflow_config_hash: tenant.workflow_config_hash,
            labels: tenant.labels,
            annotations: tenant.annotations,
            created_at: tenant.created_at,
            updated_at: tenant.updated_at,
            version: tenant.version,
        }
    }
}

/// Transition history response body.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub id: String,
    pub tenant_id: String,
    pub from_status: String,
    pub to_status: String,
    pub reason: String,
    pub triggered_by: String,
    pub desired_snapshot: Value,
    pub observed_snapshot: Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<StateTransition> for TransitionResponse {
    fn from(transition: StateTransition) -> Self {
        Self {
            id: transition.id.to_string(),
            tenant_id: transition.tenant_id.to_string(),
            from_status: transition.from_status.as_str().to_owned(),
            to_status: transition.to_status.as_str().to_owned(),
            reason: transition.reason,
            triggered_by: transition.triggered_by.as_str().to_owned(),
            desired_snapshot: transition.desired_snapshot,
            observed_snapshot: transition.observed_snapshot,
            created_at: transition.created_at,
        }
    }
}
