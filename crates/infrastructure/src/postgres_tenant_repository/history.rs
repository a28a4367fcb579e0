use super::mutate::insert_transition;
use super::*;

impl PostgresTenantRepository {
    pub(super) async fn record_transition_impl(
        &self,
        transition: StateTransition,
    ) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to begin transition append transaction: {error}"
            ))
        })?;

        insert_transition(&mut transaction, &transition).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit transition append transaction: {error}"
            ))
        })
    }

    pub(super) async fn get_history_impl(
        &self,
        tenant_id: TenantId,
    ) -> AppResult<Vec<StateTransition>> {
        let rows = sqlx::query_as::<_, TransitionRow>(
            r#"
            SELECT *
            FROM tenant_state_transitions
            WHERE tenant_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load transition history for tenant '{tenant_id}': {error}"
            ))
        })?;

        rows.into_iter().map(transition_from_row).collect()
    }
}
