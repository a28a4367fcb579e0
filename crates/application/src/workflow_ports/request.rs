use std::collections::HashMap;

use chrono::{DateTime, Utc};
use landlord_core::TenantId;
use landlord_domain::ExecutionState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input payload for one workflow invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeWorkflowRequest {
    /// Deterministic execution name (`tenant-<id>-<action>`) providers use
    /// to collapse duplicate invocations.
    pub execution_name: String,
    /// Tenant the execution operates on.
    pub tenant_id: TenantId,
    /// Operation label (`plan`, `provision`, `update`, `archive`, `delete`).
    pub operation: String,
    /// Desired container image reference.
    pub desired_image: String,
    /// Desired compute configuration.
    pub desired_config: Value,
    /// Compute provider name the workflow should target; empty string lets
    /// the provider pick its default.
    pub compute_provider: String,
    /// Free-form invocation metadata (`config_hash`, `trigger_source`).
    pub metadata: HashMap<String, String>,
}

/// Provider response to one workflow invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeWorkflowResponse {
    /// Provider-issued execution handle.
    pub execution_id: String,
    /// Execution state at invocation time.
    pub state: ExecutionState,
    /// Execution start time.
    pub started_at: DateTime<Utc>,
    /// Whether the provider collapsed this call onto an existing execution.
    pub deduplicated: bool,
}
