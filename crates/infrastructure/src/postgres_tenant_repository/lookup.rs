use super::*;

impl PostgresTenantRepository {
    pub(super) async fn get_by_id_impl(&self, id: TenantId) -> AppResult<Tenant> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to load tenant '{id}': {error}"))
            })?
            .ok_or_else(|| AppError::NotFound(format!("tenant '{id}' not found")))?;

        tenant_from_row(row)
    }

    pub(super) async fn get_by_name_impl(&self, name: &str) -> AppResult<Tenant> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to load tenant '{name}': {error}"))
            })?
            .ok_or_else(|| AppError::NotFound(format!("tenant '{name}' not found")))?;

        tenant_from_row(row)
    }
}
