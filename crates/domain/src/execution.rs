//! Provider-reported execution status and canonical sub-state derivation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use landlord_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw execution state as reported by a workflow provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Accepted, not yet started.
    Pending,
    /// Actively executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Exceeded the provider's execution deadline.
    TimedOut,
    /// Stopped on request.
    Cancelled,
}

impl ExecutionState {
    /// Returns the stable wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the stable wire value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "timed_out" => Ok(Self::TimedOut),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(AppError::Validation(format!(
                "unknown execution state '{value}'"
            ))),
        }
    }

    /// Returns whether the execution has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Returns whether the execution finished successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Canonical execution liveness stored on the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowSubState {
    /// Steps executing normally.
    Running,
    /// Accepted, waiting to start.
    Waiting,
    /// Provider-side retry loop with backoff; the degraded-workflow signal.
    BackingOff,
    /// Live execution carrying an error message.
    Error,
    /// Terminal success.
    Succeeded,
    /// Terminal failure.
    Failed,
}

impl WorkflowSubState {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::BackingOff => "backing-off",
            Self::Error => "error",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Parses the stable storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "running" => Ok(Self::Running),
            "waiting" => Ok(Self::Waiting),
            "backing-off" => Ok(Self::BackingOff),
            "error" => Ok(Self::Error),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown workflow sub-state '{value}'"
            ))),
        }
    }
}

impl std::fmt::Display for WorkflowSubState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Structured error reported by a workflow provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Human-readable error message.
    pub message: String,
    /// Optional provider-specific error kind.
    pub kind: Option<String>,
    /// Whether the provider considers the failure retryable.
    pub retryable: bool,
}

/// One provider-side execution history event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistoryEvent {
    /// Provider event type label.
    pub event_type: String,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
    /// Provider-specific event payload.
    pub details: Value,
}

/// Snapshot of one workflow execution as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionStatus {
    /// Provider-issued execution handle.
    pub execution_id: String,
    /// Raw provider state.
    pub state: ExecutionState,
    /// Execution start time.
    pub start_time: DateTime<Utc>,
    /// Execution stop time, when terminal.
    pub stop_time: Option<DateTime<Utc>>,
    /// Input payload the execution started with.
    pub input: Value,
    /// Output payload, when terminal.
    pub output: Value,
    /// Structured error, when failed.
    pub error: Option<ExecutionError>,
    /// Provider-side event history.
    pub history: Vec<ExecutionHistoryEvent>,
    /// Free-form provider metadata (may carry `retry_state`, `retry_count`,
    /// `workflow_sub_state`).
    pub metadata: HashMap<String, String>,
}

impl WorkflowExecutionStatus {
    /// Creates a minimal status snapshot for the given state.
    #[must_use]
    pub fn new(execution_id: impl Into<String>, state: ExecutionState) -> Self {
        Self {
            execution_id: execution_id.into(),
            state,
            start_time: Utc::now(),
            stop_time: None,
            input: Value::Null,
            output: Value::Null,
            error: None,
            history: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// Result of deriving the canonical sub-state from a provider status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedSubState {
    /// Canonical liveness summary.
    pub sub_state: WorkflowSubState,
    /// Provider-reported attempt count, when discoverable.
    pub retry_count: Option<u32>,
    /// Last provider error message, when present.
    pub error_message: Option<String>,
}

const RETRY_COUNT_KEYS: [&str; 5] = [
    "retry_count",
    "retrycount",
    "retry_attempts",
    "retryattempts",
    "attempts",
];

/// Maps a provider execution status onto the canonical sub-state plus retry
/// count and error message.
#[must_use]
pub fn derive_sub_state(status: &WorkflowExecutionStatus) -> DerivedSubState {
    let mut sub_state = match status.state {
        ExecutionState::Pending => WorkflowSubState::Waiting,
        ExecutionState::Running => WorkflowSubState::Running,
        ExecutionState::Succeeded => WorkflowSubState::Succeeded,
        ExecutionState::Failed | ExecutionState::TimedOut | ExecutionState::Cancelled => {
            WorkflowSubState::Failed
        }
    };

    if let Some(declared) = status.metadata.get("workflow_sub_state")
        && let Ok(parsed) = WorkflowSubState::parse(declared.trim())
    {
        sub_state = parsed;
    }

    if metadata_signals_backoff(&status.metadata) {
        sub_state = WorkflowSubState::BackingOff;
    }

    let retry_count = retry_count_from_metadata(&status.metadata)
        .or_else(|| retry_count_from_history(&status.history));

    let mut error_message = None;
    if let Some(error) = &status.error
        && !error.message.trim().is_empty()
    {
        error_message = Some(error.message.clone());
        if matches!(
            sub_state,
            WorkflowSubState::Running | WorkflowSubState::Waiting
        ) {
            sub_state = WorkflowSubState::Error;
        }
    }

    DerivedSubState {
        sub_state,
        retry_count,
        error_message,
    }
}

fn metadata_signals_backoff(metadata: &HashMap<String, String>) -> bool {
    metadata.iter().any(|(key, value)| {
        let key = key.to_lowercase();
        if !key.contains("backoff") && !key.contains("retry_state") {
            return false;
        }

        let value = value.to_lowercase();
        value.contains("backoff") || value.contains("backing") || value.contains("true")
    })
}

fn retry_count_from_metadata(metadata: &HashMap<String, String>) -> Option<u32> {
    RETRY_COUNT_KEYS.iter().find_map(|key| {
        metadata
            .get(*key)
            .and_then(|value| value.trim().parse::<u32>().ok())
    })
}

fn retry_count_from_history(history: &[ExecutionHistoryEvent]) -> Option<u32> {
    let count = history
        .iter()
        .filter(|event| event.event_type.to_lowercase().contains("retry"))
        .count();
    u32::try_from(count).ok().filter(|count| *count > 0)
}
