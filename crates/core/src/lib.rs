//! Shared primitives for all Rust crates in Landlord.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type used across Landlord crates.
pub type AppResult<T> = Result<T, AppError>;

/// Tenant identifier used as the primary key for every provisioned tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Creates a random tenant identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a tenant identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Parses a tenant identifier from its string form.
    pub fn parse(value: &str) -> AppResult<Self> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid tenant id '{value}': {error}")))
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TenantId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Insert conflicts with an existing row (unique-name violation).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic-concurrency write lost against a newer stored version.
    #[error("version conflict: {0}")]
    VersionConflict(String),

    /// Status change not present in the tenant lifecycle transition table.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Workflow provider could not be reached or answered with a server error.
    #[error("workflow provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Workflow provider call exceeded its deadline.
    #[error("workflow provider timeout: {0}")]
    ProviderTimeout(String),

    /// Workflow provider rejected the request as non-retryable.
    #[error("workflow provider rejected request: {0}")]
    ProviderRejected(String),

    /// Workflow execution did not reach a terminal state within the stop window.
    #[error("stop timeout: {0}")]
    StopTimeout(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the reconciler may retry after this error.
    ///
    /// Fatal errors move the tenant to `failed`; retryable errors re-enqueue
    /// with exponential backoff up to the configured attempt cap.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(_)
            | Self::ProviderTimeout(_)
            | Self::VersionConflict(_)
            | Self::StopTimeout(_)
            | Self::Internal(_) => true,
            Self::Validation(_)
            | Self::NotFound(_)
            | Self::AlreadyExists(_)
            | Self::InvalidTransition(_)
            | Self::ProviderRejected(_) => false,
        }
    }
}
