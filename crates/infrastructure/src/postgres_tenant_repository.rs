use std::collections::HashMap;

use async_trait::async_trait;
use landlord_application::{TenantListQuery, TenantRepository};
use landlord_core::{AppError, AppResult, TenantId};
use landlord_domain::{
    StateTransition, Tenant, TenantStatus, TriggerSource, WorkflowSubState,
};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

mod history;
mod listing;
mod lookup;
mod mutate;

/// PostgreSQL-backed tenant repository.
///
/// Optimistic concurrency is enforced in SQL: updates match on the stored
/// `version` and bump it by one; zero affected rows means a stale write.
#[derive(Clone)]
pub struct PostgresTenantRepository {
    pool: PgPool,
}

impl PostgresTenantRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TenantRow {
    id: uuid::Uuid,
    name: String,
    status: String,
    status_message: String,
    desired_image: String,
    desired_config: Value,
    observed_image: String,
    observed_config: Value,
    observed_resource_ids: Value,
    workflow_execution_id: Option<String>,
    workflow_sub_state: Option<String>,
    workflow_retry_count: Option<i32>,
    workflow_error_message: Option<String>,
    workflow_config_hash: Option<String>,
    labels: Value,
    annotations: Value,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    version: i64,
}

#[derive(Debug, FromRow)]
struct TransitionRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    from_status: String,
    to_status: String,
    reason: String,
    triggered_by: String,
    desired_snapshot: Value,
    observed_snapshot: Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

fn tenant_from_row(row: TenantRow) -> AppResult<Tenant> {
    let workflow_sub_state = row
        .workflow_sub_state
        .as_deref()
        .map(WorkflowSubState::parse)
        .transpose()?;
    let workflow_retry_count = row
        .workflow_retry_count
        .map(|count| {
            u32::try_from(count).map_err(|error| {
                AppError::Internal(format!(
                    "stored workflow retry count {count} is invalid: {error}"
                ))
            })
        })
        .transpose()?;

    Ok(Tenant {
        id: TenantId::from_uuid(row.id),
        name: row.name,
        status: TenantStatus::parse(row.status.as_str())?,
        status_message: row.status_message,
        desired_image: row.desired_image,
        desired_config: json_object(row.desired_config),
        observed_image: row.observed_image,
        observed_config: string_map_from_json(row.observed_config),
        observed_resource_ids: string_map_from_json(row.observed_resource_ids),
        workflow_execution_id: row.workflow_execution_id,
        workflow_sub_state,
        workflow_retry_count,
        workflow_error_message: row.workflow_error_message,
        workflow_config_hash: row.workflow_config_hash,
        labels: string_map_from_json(row.labels),
        annotations: string_map_from_json(row.annotations),
        created_at: row.created_at,
        updated_at: row.updated_at,
        version: row.version,
    })
}

fn transition_from_row(row: TransitionRow) -> AppResult<StateTransition> {
    Ok(StateTransition {
        id: row.id,
        tenant_id: TenantId::from_uuid(row.tenant_id),
        from_status: TenantStatus::parse(row.from_status.as_str())?,
        to_status: TenantStatus::parse(row.to_status.as_str())?,
        reason: row.reason,
        triggered_by: TriggerSource::parse(row.triggered_by.as_str())?,
        desired_snapshot: row.desired_snapshot,
        observed_snapshot: row.observed_snapshot,
        created_at: row.created_at,
    })
}

fn json_object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn string_map_from_json(value: Value) -> HashMap<String, String> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(value) => Some((key, value)),
                _ => None,
            })
            .collect(),
        _ => HashMap::new(),
    }
}

fn string_map_to_json(map: &HashMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect(),
    )
}

#[async_trait]
impl TenantRepository for PostgresTenantRepository {
    async fn create(&self, tenant: Tenant) -> AppResult<Tenant> {
        self.create_impl(tenant).await
    }

    async fn get_by_id(&self, id: TenantId) -> AppResult<Tenant> {
        self.get_by_id_impl(id).await
    }

    async fn get_by_name(&self, name: &str) -> AppResult<Tenant> {
        self.get_by_name_impl(name).await
    }

    async fn update_with_transition(
        &self,
        tenant: Tenant,
        transition: Option<StateTransition>,
    ) -> AppResult<Tenant> {
        self.update_with_transition_impl(tenant, transition).await
    }

    async fn list(&self, query: TenantListQuery) -> AppResult<Vec<Tenant>> {
        self.list_impl(query).await
    }

    async fn list_for_reconciliation(&self) -> AppResult<Vec<Tenant>> {
        self.list_for_reconciliation_impl().await
    }

    async fn delete(&self, id: TenantId) -> AppResult<()> {
        self.delete_impl(id).await
    }

    async fn record_transition(&self, transition: StateTransition) -> AppResult<()> {
        self.record_transition_impl(transition).await
    }

    async fn get_history(&self, tenant_id: TenantId) -> AppResult<Vec<StateTransition>> {
        self.get_history_impl(tenant_id).await
    }
}
