use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use landlord_application::{TenantListQuery, TenantRepository};
use landlord_core::{AppError, AppResult, TenantId};
use landlord_domain::{StateTransition, Tenant, TenantStatus};
use tokio::sync::RwLock;

/// In-memory tenant repository implementation.
///
/// Mirrors the Postgres contract including optimistic concurrency; used by
/// tests and local single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
    transitions: RwLock<Vec<StateTransition>>,
}

impl InMemoryTenantRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            transitions: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn create(&self, tenant: Tenant) -> AppResult<Tenant> {
        let mut tenants = self.tenants.write().await;
        if tenants.values().any(|stored| stored.name == tenant.name) {
            return Err(AppError::AlreadyExists(format!(
                "tenant '{}' already exists",
                tenant.name
            )));
        }
        if tenants.contains_key(&tenant.id) {
            return Err(AppError::AlreadyExists(format!(
                "tenant '{}' already exists",
                tenant.id
            )));
        }

        let mut tenant = tenant;
        tenant.version = 1;
        tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn get_by_id(&self, id: TenantId) -> AppResult<Tenant> {
        self.tenants
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("tenant '{id}' not found")))
    }

    async fn get_by_name(&self, name: &str) -> AppResult<Tenant> {
        self.tenants
            .read()
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
        let mut tenants = self.tenants.write().await;
        let stored = tenants
            .get_mut(&tenant.id)
            .ok_or_else(|| AppError::NotFound(format!("tenant '{}' not found", tenant.id)))?;
        if stored.version != tenant.version {
            return Err(AppError::VersionConflict(format!(
                "tenant '{}' version {} is stale (stored version {})",
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
            self.transitions.write().await.push(transition);
        }
        Ok(updated)
    }

    async fn list(&self, query: TenantListQuery) -> AppResult<Vec<Tenant>> {
        let tenants = self.tenants.read().await;
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
        let tenants = self.tenants.read().await;
        let mut rows: Vec<Tenant> = tenants
            .values()
            .filter(|tenant| !tenant.status.is_terminal())
            .cloned()
            .collect();
        rows.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(rows)
    }

    async fn delete(&self, id: TenantId) -> AppResult<()> {
        let removed = self.tenants.write().await.remove(&id);
        if removed.is_none() {
            return Err(AppError::NotFound(format!("tenant '{id}' not found")));
        }

        self.transitions
            .write()
            .await
            .retain(|transition| transition.tenant_id != id);
        Ok(())
    }

    async fn record_transition(&self, transition: StateTransition) -> AppResult<()> {
        self.transitions.write().await.push(transition);
        Ok(())
    }

    async fn get_history(&self, tenant_id: TenantId) -> AppResult<Vec<StateTransition>> {
        let transitions = self.transitions.read().await;
        let mut rows: Vec<StateTransition> = transitions
            .iter()
            .filter(|transition| transition.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(rows)
    }
}

fn matches_query(tenant: &Tenant, query: &TenantListQuery) -> bool {
    if !query.statuses.is_empty() && !query.statuses.contains(&tenant.status) {
        return false;
    }
    if !query.include_deleted
        && query.statuses.is_empty()
        && matches!(
            tenant.status,
            TenantStatus::Deleting | TenantStatus::Archived
        )
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
