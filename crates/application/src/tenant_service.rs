use std::collections::HashMap;
use std::sync::Arc;

use landlord_core::{AppError, AppResult, TenantId};
use landlord_domain::{
    NewTenantInput, StateTransition, Tenant, TenantStatus, TriggerSource, validate_transition,
};
use serde_json::{Map, Value};
use tracing::info;

use crate::tenant_ports::{TenantListQuery, TenantRepository};

/// Tenant creation payload accepted from the API.
#[derive(Debug, Clone, Default)]
pub struct CreateTenantInput {
    /// Unique human-readable tenant name.
    pub name: String,
    /// Desired container image reference.
    pub desired_image: String,
    /// Desired provider-specific compute configuration.
    pub desired_config: Map<String, Value>,
    /// User-supplied labels.
    pub labels: HashMap<String, String>,
    /// User-supplied annotations.
    pub annotations: HashMap<String, String>,
}

/// Desired-state update payload accepted from the API.
#[derive(Debug, Clone, Default)]
pub struct UpdateTenantInput {
    /// Replacement image reference, when given.
    pub desired_image: Option<String>,
    /// Replacement compute configuration, when given.
    pub desired_config: Option<Map<String, Value>>,
    /// Replacement labels, when given.
    pub labels: Option<HashMap<String, String>>,
    /// Replacement annotations, when given.
    pub annotations: Option<HashMap<String, String>>,
}

/// API-facing tenant writes.
///
/// The service writes desired state only: it never touches
/// `workflow_sub_state`, `workflow_retry_count`, or
/// `workflow_error_message`, and never calls the workflow provider. The
/// reconciler observes these writes and drives the world to match.
#[derive(Clone)]
pub struct TenantService {
    repository: Arc<dyn TenantRepository>,
}

impl TenantService {
    /// Creates a tenant service over the given repository.
    #[must_use]
    pub fn new(repository: Arc<dyn TenantRepository>) -> Self {
        Self { repository }
    }

    /// Accepts a new tenant in the `requested` status.
    pub async fn create_tenant(&self, input: CreateTenantInput) -> AppResult<Tenant> {
        if input.desired_image.trim().is_empty() {
            return Err(AppError::Validation(
                "desired_image must not be empty".to_owned(),
            ));
        }

        let tenant = Tenant::new(NewTenantInput {
            name: input.name,
            desired_image: input.desired_image.trim().to_owned(),
            desired_config: input.desired_config,
            labels: input.labels,
            annotations: input.annotations,
        })?;

        let tenant = self.repository.create(tenant).await?;
        info!(tenant_id = %tenant.id, name = %tenant.name, "tenant requested");
        Ok(tenant)
    }

    /// Returns one tenant by identifier.
    pub async fn get_tenant(&self, id: TenantId) -> AppResult<Tenant> {
        self.repository.get_by_id(id).await
    }

    /// Returns one tenant by unique name.
    pub async fn get_tenant_by_name(&self, name: &str) -> AppResult<Tenant> {
        self.repository.get_by_name(name).await
    }

    /// Lists tenants matching the query.
    pub async fn list_tenants(&self, query: TenantListQuery) -> AppResult<Vec<Tenant>> {
        self.repository.list(query).await
    }

    /// Returns the ordered transition history for one tenant.
    pub async fn get_history(&self, id: TenantId) -> AppResult<Vec<StateTransition>> {
        self.repository.get_history(id).await
    }

    /// Replaces the desired state of a ready tenant and moves it to
    /// `updating`.
    ///
    /// Tenants already in `updating` accept a re-declared desired state
    /// without a new transition row; any other status is refused.
    pub async fn update_tenant(&self, id: TenantId, input: UpdateTenantInput) -> AppResult<Tenant> {
        let mut tenant = self.repository.get_by_id(id).await?;
        let from_status = tenant.status;

        match from_status {
            TenantStatus::Ready => validate_transition(from_status, TenantStatus::Updating)?,
            TenantStatus::Updating => {}
            other => {
                return Err(AppError::InvalidTransition(format!(
                    "tenant '{id}' cannot accept a desired-state update in status '{other}'"
                )));
            }
        }

        if let Some(image) = input.desired_image {
            if image.trim().is_empty() {
                return Err(AppError::Validation(
                    "desired_image must not be empty".to_owned(),
                ));
            }
            tenant.desired_image = image.trim().to_owned();
        }
        if let Some(config) = input.desired_config {
            tenant.desired_config = config;
        }
        if let Some(labels) = input.labels {
            tenant.labels = labels;
        }
        if let Some(annotations) = input.annotations {
            tenant.annotations = annotations;
        }

        tenant.status = TenantStatus::Updating;
        tenant.status_message = "desired state updated".to_owned();

        let transition = (from_status != TenantStatus::Updating).then(|| {
            StateTransition::record(
                &tenant,
                from_status,
                TenantStatus::Updating,
                "desired state updated",
                TriggerSource::Api,
            )
        });

        self.repository.update_with_transition(tenant, transition).await
    }

    /// Moves a tenant into `archiving`.
    pub async fn archive_tenant(&self, id: TenantId) -> AppResult<Tenant> {
        let mut tenant = self.repository.get_by_id(id).await?;
        let from_status = tenant.status;
        if from_status == TenantStatus::Archiving {
            return Ok(tenant);
        }

        validate_transition(from_status, TenantStatus::Archiving)?;
        tenant.status = TenantStatus::Archiving;
        tenant.status_message = "archive requested".to_owned();

        let transition = StateTransition::record(
            &tenant,
            from_status,
            TenantStatus::Archiving,
            "archive requested",
            TriggerSource::Api,
        );
        self.repository
            .update_with_transition(tenant, Some(transition))
            .await
    }

    /// Moves an archived tenant into `deleting`.
    pub async fn delete_tenant(&self, id: TenantId) -> AppResult<Tenant> {
        let mut tenant = self.repository.get_by_id(id).await?;
        let from_status = tenant.status;
        if from_status == TenantStatus::Deleting {
            return Ok(tenant);
        }
        if from_status != TenantStatus::Archived {
            return Err(AppError::InvalidTransition(format!(
                "tenant '{id}' must be archived before deletion (currently '{from_status}')"
            )));
        }

        validate_transition(from_status, TenantStatus::Deleting)?;
        tenant.status = TenantStatus::Deleting;
        tenant.status_message = "deletion requested".to_owned();

        let transition = StateTransition::record(
            &tenant,
            from_status,
            TenantStatus::Deleting,
            "deletion requested",
            TriggerSource::Api,
        );
        self.repository
            .update_with_transition(tenant, Some(transition))
            .await
    }
}
