use async_trait::async_trait;
use chrono::{DateTime, Utc};
use landlord_core::{AppResult, TenantId};
use landlord_domain::{StateTransition, Tenant, TenantStatus, WorkflowSubState};

/// Filtered tenant listing query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TenantListQuery {
    /// Restrict to these lifecycle statuses (empty means all).
    pub statuses: Vec<TenantStatus>,
    /// Restrict to tenants created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Restrict to tenants created at or before this instant.
    pub created_before: Option<DateTime<Utc>>,
    /// Restrict to these workflow sub-states (empty means all).
    pub sub_states: Vec<WorkflowSubState>,
    /// Restrict by presence or absence of a workflow error message.
    pub has_workflow_error: Option<bool>,
    /// Restrict to tenants whose workflow retry count is at least this value.
    pub min_retry_count: Option<u32>,
    /// Include tenants in the `deleting` and `archived` statuses.
    pub include_deleted: bool,
    /// Page size; zero means no limit.
    pub limit: usize,
    /// Row offset.
    pub offset: usize,
}

/// Repository port for tenant rows and their transition history.
///
/// Implementations enforce optimistic concurrency: every successful update
/// bumps `version` by exactly one, and stale writes fail with
/// `AppError::VersionConflict` leaving the row unchanged.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Inserts a tenant with `version = 1`.
    ///
    /// Fails with `AppError::AlreadyExists` on a duplicate name.
    async fn create(&self, tenant: Tenant) -> AppResult<Tenant>;

    /// Returns one tenant by identifier.
    async fn get_by_id(&self, id: TenantId) -> AppResult<Tenant>;

    /// Returns one tenant by unique name.
    async fn get_by_name(&self, name: &str) -> AppResult<Tenant>;

    /// Writes all mutable fields when the stored version still matches,
    /// atomically appending the paired transition row when given.
    ///
    /// Returns the stored tenant with its bumped version.
    async fn update_with_transition(
        &self,
        tenant: Tenant,
        transition: Option<StateTransition>,
    ) -> AppResult<Tenant>;

    /// Writes all mutable fields when the stored version still matches.
    async fn update(&self, tenant: Tenant) -> AppResult<Tenant> {
        self.update_with_transition(tenant, None).await
    }

    /// Lists tenants matching the query, newest first.
    async fn list(&self, query: TenantListQuery) -> AppResult<Vec<Tenant>>;

    /// Lists every tenant in a non-terminal status, oldest first.
    async fn list_for_reconciliation(&self) -> AppResult<Vec<Tenant>>;

    /// Hard-deletes one tenant row and its history.
    async fn delete(&self, id: TenantId) -> AppResult<()>;

    /// Appends one transition history row.
    async fn record_transition(&self, transition: StateTransition) -> AppResult<()>;

    /// Returns the ordered transition history for one tenant.
    async fn get_history(&self, tenant_id: TenantId) -> AppResult<Vec<StateTransition>>;
}
