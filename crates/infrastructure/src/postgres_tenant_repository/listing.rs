use sqlx::{Postgres, QueryBuilder};

use super::*;

impl PostgresTenantRepository {
    pub(super) async fn list_impl(&self, query: TenantListQuery) -> AppResult<Vec<Tenant>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM tenants WHERE 1 = 1");

        if query.statuses.is_empty() {
            if !query.include_deleted {
                builder.push(" AND status NOT IN (");
                let mut separated = builder.separated(", ");
                separated.push_bind(TenantStatus::Deleting.as_str());
                separated.push_bind(TenantStatus::Archived.as_str());
                builder.push(")");
            }
        } else {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in &query.statuses {
                separated.push_bind(status.as_str());
            }
            builder.push(")");
        }

        if let Some(created_after) = query.created_after {
            builder.push(" AND created_at >= ");
            builder.push_bind(created_after);
        }
        if let Some(created_before) = query.created_before {
            builder.push(" AND created_at <= ");
            builder.push_bind(created_before);
        }

        if !query.sub_states.is_empty() {
            builder.push(" AND workflow_sub_state IN (");
            let mut separated = builder.separated(", ");
            for sub_state in &query.sub_states {
                separated.push_bind(sub_state.as_str());
            }
            builder.push(")");
        }

        if let Some(has_error) = query.has_workflow_error {
            if has_error {
                builder.push(" AND workflow_error_message IS NOT NULL");
            } else {
                builder.push(" AND workflow_error_message IS NULL");
            }
        }

        if let Some(min_retry_count) = query.min_retry_count {
            builder.push(" AND workflow_retry_count >= ");
            builder.push_bind(i64::from(min_retry_count));
        }

        builder.push(" ORDER BY created_at DESC");

        if query.limit > 0 {
            let limit = i64::try_from(query.limit).map_err(|error| {
                AppError::Validation(format!("invalid tenant list limit: {error}"))
            })?;
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }
        if query.offset > 0 {
            let offset = i64::try_from(query.offset).map_err(|error| {
                AppError::Validation(format!("invalid tenant list offset: {error}"))
            })?;
            builder.push(" OFFSET ");
            builder.push_bind(offset);
        }

        let rows = builder
            .build_query_as::<TenantRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list tenants: {error}")))?;

        rows.into_iter().map(tenant_from_row).collect()
    }

    pub(super) async fn list_for_reconciliation_impl(&self) -> AppResult<Vec<Tenant>> {
        let rows = sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT *
            FROM tenants
            WHERE status IN (
                'requested',
                'planning',
                'provisioning',
                'updating',
                'deleting',
                'archiving'
            )
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list tenants for reconciliation: {error}"))
        })?;

        rows.into_iter().map(tenant_from_row).collect()
    }
}
