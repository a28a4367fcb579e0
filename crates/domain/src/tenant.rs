use std::collections::HashMap;

use chrono::{DateTime, Utc};
use landlord_core::{AppError, AppResult, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::execution::WorkflowSubState;

/// Longest accepted tenant name.
pub const TENANT_NAME_MAX_LENGTH: usize = 255;

/// Tenant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Desired state accepted, no workflow triggered yet.
    Requested,
    /// Planning workflow in flight.
    Planning,
    /// Provisioning workflow in flight.
    Provisioning,
    /// Update workflow in flight.
    Updating,
    /// Delete workflow in flight.
    Deleting,
    /// Archive workflow in flight.
    Archiving,
    /// Provisioned and serving.
    Ready,
    /// Compute released, record retained.
    Archived,
    /// Terminal failure; requires explicit user action to leave.
    Failed,
}

impl TenantStatus {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Planning => "planning",
            Self::Provisioning => "provisioning",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Archiving => "archiving",
            Self::Ready => "ready",
            Self::Archived => "archived",
            Self::Failed => "failed",
        }
    }

    /// Parses the stable storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "requested" => Ok(Self::Requested),
            "planning" => Ok(Self::Planning),
            "provisioning" => Ok(Self::Provisioning),
            "updating" => Ok(Self::Updating),
            "deleting" => Ok(Self::Deleting),
            "archiving" => Ok(Self::Archiving),
            "ready" => Ok(Self::Ready),
            "archived" => Ok(Self::Archived),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown tenant status '{value}'"
            ))),
        }
    }

    /// Returns whether the reconciler must leave this tenant alone.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Archived | Self::Failed)
    }

    /// Returns every status in storage order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[
            Self::Requested,
            Self::Planning,
            Self::Provisioning,
            Self::Updating,
            Self::Deleting,
            Self::Archiving,
            Self::Ready,
            Self::Archived,
            Self::Failed,
        ]
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Actor responsible for a recorded state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Explicit user request through the HTTP API.
    Api,
    /// Reconciler-driven progress.
    Controller,
    /// Reconciler restart after a desired-config change.
    #[serde(rename = "controller:config-change")]
    ControllerConfigChange,
}

impl TriggerSource {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Controller => "controller",
            Self::ControllerConfigChange => "controller:config-change",
        }
    }

    /// Parses the stable storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "api" => Ok(Self::Api),
            "controller" => Ok(Self::Controller),
            "controller:config-change" => Ok(Self::ControllerConfigChange),
            _ => Err(AppError::Validation(format!(
                "unknown trigger source '{value}'"
            ))),
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Input payload used to construct a validated tenant.
#[derive(Debug, Clone, Default)]
pub struct NewTenantInput {
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

/// Persisted tenant record: desired state, observed state, and the workflow
/// execution currently driving one toward the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Stable tenant identifier.
    pub id: TenantId,
    /// Unique human-readable name.
    pub name: String,
    /// Lifecycle status.
    pub status: TenantStatus,
    /// Last human-readable status context.
    pub status_message: String,
    /// Desired container image reference.
    pub desired_image: String,
    /// Desired provider-specific compute configuration.
    pub desired_config: Map<String, Value>,
    /// Last reported image.
    pub observed_image: String,
    /// Last reported configuration.
    pub observed_config: HashMap<String, String>,
    /// Last reported provider resource identifiers.
    pub observed_resource_ids: HashMap<String, String>,
    /// Handle of the currently tracked workflow execution.
    pub workflow_execution_id: Option<String>,
    /// Canonical liveness of the tracked execution.
    pub workflow_sub_state: Option<WorkflowSubState>,
    /// Provider-reported attempt count for the tracked execution.
    pub workflow_retry_count: Option<u32>,
    /// Last error text surfaced from the provider.
    pub workflow_error_message: Option<String>,
    /// Hash of `desired_config` captured when the tracked execution started.
    pub workflow_config_hash: Option<String>,
    /// User-supplied labels.
    pub labels: HashMap<String, String>,
    /// User-supplied annotations.
    pub annotations: HashMap<String, String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency version; each successful update adds one.
    pub version: i64,
}

impl Tenant {
    /// Creates a validated tenant in the `requested` status.
    pub fn new(input: NewTenantInput) -> AppResult<Self> {
        let name = input.name.trim().to_owned();
        if name.is_empty() {
            return Err(AppError::Validation(
                "tenant name must not be empty or whitespace".to_owned(),
            ));
        }

        if name.len() > TENANT_NAME_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "tenant name must not exceed {TENANT_NAME_MAX_LENGTH} characters"
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: TenantId::new(),
            name,
            status: TenantStatus::Requested,
            status_message: "tenant requested".to_owned(),
            desired_image: input.desired_image,
            desired_config: input.desired_config,
            observed_image: String::new(),
            observed_config: HashMap::new(),
            observed_resource_ids: HashMap::new(),
            workflow_execution_id: None,
            workflow_sub_state: None,
            workflow_retry_count: None,
            workflow_error_message: None,
            workflow_config_hash: None,
            labels: input.labels,
            annotations: input.annotations,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    /// Returns the config hash of the current desired configuration.
    #[must_use]
    pub fn desired_config_hash(&self) -> String {
        crate::config_hash::compute_config_hash(&self.desired_config)
    }

    /// Returns a JSON snapshot of the desired state for transition history.
    #[must_use]
    pub fn desired_snapshot(&self) -> Value {
        serde_json::json!({
            "image": self.desired_image,
            "config": Value::Object(self.desired_config.clone()),
        })
    }

    /// Returns a JSON snapshot of the observed state for transition history.
    #[must_use]
    pub fn observed_snapshot(&self) -> Value {
        serde_json::json!({
            "image": self.observed_image,
            "config": self.observed_config,
            "resource_ids": self.observed_resource_ids,
        })
    }

    /// Clears every workflow tracking field after a terminal execution.
    pub fn clear_workflow_tracking(&mut self) {
        self.workflow_execution_id = None;
        self.workflow_sub_state = None;
        self.workflow_retry_count = None;
        self.workflow_error_message = None;
    }
}

/// Append-only record of one tenant status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Stable transition identifier.
    pub id: Uuid,
    /// Tenant the transition belongs to.
    pub tenant_id: TenantId,
    /// Status before the change.
    pub from_status: TenantStatus,
    /// Status after the change.
    pub to_status: TenantStatus,
    /// Human-readable reason for the change.
    pub reason: String,
    /// Actor responsible for the change.
    pub triggered_by: TriggerSource,
    /// Desired state at the moment of the change.
    pub desired_snapshot: Value,
    /// Observed state at the moment of the change.
    pub observed_snapshot: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl StateTransition {
    /// Builds a transition row snapshotting the tenant's current state.
    #[must_use]
    pub fn record(
        tenant: &Tenant,
        from_status: TenantStatus,
        to_status: TenantStatus,
        reason: impl Into<String>,
        triggered_by: TriggerSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            from_status,
            to_status,
            reason: reason.into(),
            triggered_by,
            desired_snapshot: tenant.desired_snapshot(),
            observed_snapshot: tenant.observed_snapshot(),
            created_at: Utc::now(),
        }
    }
}
