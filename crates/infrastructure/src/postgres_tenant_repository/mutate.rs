use super::*;

impl PostgresTenantRepository {
    pub(super) async fn create_impl(&self, tenant: Tenant) -> AppResult<Tenant> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"
            INSERT INTO tenants (
                id,
                name,
                status,
                status_message,
                desired_image,
                desired_config,
                observed_image,
                observed_config,
                observed_resource_ids,
                workflow_execution_id,
                workflow_sub_state,
                workflow_retry_count,
                workflow_error_message,
                workflow_config_hash,
                labels,
                annotations,
                created_at,
                updated_at,
                version
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9,
                NULL, NULL, NULL, NULL, NULL,
                $10, $11, now(), now(), 1
            )
            RETURNING *
            "#,
        )
        .bind(tenant.id.as_uuid())
        .bind(tenant.name.as_str())
        .bind(tenant.status.as_str())
        .bind(tenant.status_message.as_str())
        .bind(tenant.desired_image.as_str())
        .bind(Value::Object(tenant.desired_config.clone()))
        .bind(tenant.observed_image.as_str())
        .bind(string_map_to_json(&tenant.observed_config))
        .bind(string_map_to_json(&tenant.observed_resource_ids))
        .bind(string_map_to_json(&tenant.labels))
        .bind(string_map_to_json(&tenant.annotations))
        .fetch_one(&self.pool)
        .await
        .map_err(|error| match &error {
            sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
                AppError::AlreadyExists(format!("tenant '{}' already exists", tenant.name))
            }
            _ => AppError::Internal(format!(
                "failed to create tenant '{}': {error}",
                tenant.name
            )),
        })?;

        tenant_from_row(row)
    }

    pub(super) async fn update_with_transition_impl(
        &self,
        tenant: Tenant,
        transition: Option<StateTransition>,
    ) -> AppResult<Tenant> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin tenant update transaction: {error}"))
        })?;

        let updated = sqlx::query_as::<_, TenantRow>(
            r#"
            UPDATE tenants
            SET
                name = $3,
                status = $4,
                status_message = $5,
                desired_image = $6,
                desired_config = $7,
                observed_image = $8,
                observed_config = $9,
                observed_resource_ids = $10,
                workflow_execution_id = $11,
                workflow_sub_state = $12,
                workflow_retry_count = $13,
                workflow_error_message = $14,
                workflow_config_hash = $15,
                labels = $16,
                annotations = $17,
                updated_at = now(),
                version = version + 1
            WHERE id = $1
              AND version = $2
            RETURNING *
            "#,
        )
        .bind(tenant.id.as_uuid())
        .bind(tenant.version)
        .bind(tenant.name.as_str())
        .bind(tenant.status.as_str())
        .bind(tenant.status_message.as_str())
        .bind(tenant.desired_image.as_str())
        .bind(Value::Object(tenant.desired_config.clone()))
        .bind(tenant.observed_image.as_str())
        .bind(string_map_to_json(&tenant.observed_config))
        .bind(string_map_to_json(&tenant.observed_resource_ids))
        .bind(tenant.workflow_execution_id.as_deref())
        .bind(
            tenant
                .workflow_sub_state
                .map(|sub_state| sub_state.as_str()),
        )
        .bind(tenant.workflow_retry_count.map(i64::from))
        .bind(tenant.workflow_error_message.as_deref())
        .bind(tenant.workflow_config_hash.as_deref())
        .bind(string_map_to_json(&tenant.labels))
        .bind(string_map_to_json(&tenant.annotations))
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to update tenant '{}': {error}", tenant.id))
        })?;

        let Some(updated) = updated else {
            // Distinguish a missing row from a stale version.
            let exists = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM tenants WHERE id = $1",
            )
            .bind(tenant.id.as_uuid())
            .fetch_one(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to check tenant '{}' existence: {error}",
                    tenant.id
                ))
            })?;

            return Err(if exists > 0 {
                AppError::VersionConflict(format!(
                    "tenant '{}' version {} is stale",
                    tenant.id, tenant.version
                ))
            } else {
                AppError::NotFound(format!("tenant '{}' not found", tenant.id))
            });
        };

        if let Some(transition) = &transition {
            insert_transition(&mut transaction, transition).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit tenant update transaction: {error}"
            ))
        })?;

        tenant_from_row(updated)
    }

    pub(super) async fn delete_impl(&self, id: TenantId) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete tenant '{id}': {error}"))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("tenant '{id}' not found")));
        }

        Ok(())
    }
}

pub(super) async fn insert_transition(
    transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    transition: &StateTransition,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO tenant_state_transitions (
            id,
            tenant_id,
            from_status,
            to_status,
            reason,
            triggered_by,
            desired_snapshot,
            observed_snapshot,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(transition.id)
    .bind(transition.tenant_id.as_uuid())
    .bind(transition.from_status.as_str())
    .bind(transition.to_status.as_str())
    .bind(transition.reason.as_str())
    .bind(transition.triggered_by.as_str())
    .bind(transition.desired_snapshot.clone())
    .bind(transition.observed_snapshot.clone())
    .bind(transition.created_at)
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to record transition for tenant '{}': {error}",
            transition.tenant_id
        ))
    })?;

    Ok(())
}
