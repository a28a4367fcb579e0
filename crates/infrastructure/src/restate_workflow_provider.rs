use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use landlord_application::{
    InvokeWorkflowRequest, InvokeWorkflowResponse, WorkflowProvider, WorkflowSpec,
};
use landlord_core::{AppError, AppResult};
use landlord_domain::{
    ExecutionError, ExecutionHistoryEvent, ExecutionState, WorkflowExecutionStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Connection settings for the Restate workflow provider.
#[derive(Debug, Clone)]
pub struct RestateProviderConfig {
    /// Ingress base URL, without a trailing slash.
    pub base_url: String,
}

impl RestateProviderConfig {
    /// Creates a validated provider configuration.
    pub fn new(base_url: impl Into<String>) -> AppResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(AppError::Validation(
                "restate base_url must not be empty".to_owned(),
            ));
        }

        Ok(Self { base_url })
    }
}

/// HTTP workflow provider speaking the Restate ingress API.
///
/// Idempotency rides on the `idempotency-key` request header carrying the
/// deterministic execution name; the ingress collapses duplicate
/// invocations onto the already-running execution.
pub struct RestateWorkflowProvider {
    http_client: reqwest::Client,
    config: RestateProviderConfig,
}

impl RestateWorkflowProvider {
    /// Creates a provider over an existing HTTP client.
    #[must_use]
    pub fn new(http_client: reqwest::Client, config: RestateProviderConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn read_failure(context: &str, response: reqwest::Response) -> AppError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_owned());

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            AppError::ProviderUnavailable(format!(
                "{context} returned status {status}: {body}"
            ))
        } else if status.is_client_error() {
            AppError::ProviderRejected(format!("{context} returned status {status}: {body}"))
        } else {
            AppError::Internal(format!("{context} returned status {status}: {body}"))
        }
    }

    fn transport_failure(context: &str, error: reqwest::Error) -> AppError {
        if error.is_timeout() {
            AppError::ProviderTimeout(format!("{context} timed out: {error}"))
        } else {
            AppError::ProviderUnavailable(format!("{context} transport error: {error}"))
        }
    }
}

#[derive(Debug, Serialize)]
struct InvokeRequestBody<'a> {
    execution_name: &'a str,
    tenant_id: String,
    operation: &'a str,
    desired_image: &'a str,
    desired_config: &'a Value,
    compute_provider: &'a str,
    metadata: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct InvokeResponseBody {
    execution_id: String,
    state: String,
    started_at: DateTime<Utc>,
    #[serde(default)]
    deduplicated: bool,
}

#[derive(Debug, Deserialize)]
struct ExecutionStatusBody {
    execution_id: String,
    state: String,
    start_time: DateTime<Utc>,
    #[serde(default)]
    stop_time: Option<DateTime<Utc>>,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<ExecutionErrorBody>,
    #[serde(default)]
    history: Vec<ExecutionHistoryEventBody>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ExecutionErrorBody {
    message: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default = "default_retryable")]
    retryable: bool,
}

fn default_retryable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ExecutionHistoryEventBody {
    event_type: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    details: Value,
}

fn execution_status_from_body(body: ExecutionStatusBody) -> AppResult<WorkflowExecutionStatus> {
    Ok(WorkflowExecutionStatus {
        execution_id: body.execution_id,
        state: ExecutionState::parse(body.state.as_str())?,
        start_time: body.start_time,
        stop_time: body.stop_time,
        input: body.input,
        output: body.output,
        error: body.error.map(|error| ExecutionError {
            message: error.message,
            kind: error.kind,
            retryable: error.retryable,
        }),
        history: body
            .history
            .into_iter()
            .map(|event| ExecutionHistoryEvent {
                event_type: event.event_type,
                timestamp: event.timestamp,
                details: event.details,
            })
            .collect(),
        metadata: body.metadata,
    })
}

#[async_trait]
impl WorkflowProvider for RestateWorkflowProvider {
    fn name(&self) -> &str {
        "restate"
    }

    async fn invoke(
        &self,
        workflow_id: &str,
        request: InvokeWorkflowRequest,
    ) -> AppResult<InvokeWorkflowResponse> {
        let body = InvokeRequestBody {
            execution_name: request.execution_name.as_str(),
            tenant_id: request.tenant_id.to_string(),
            operation: request.operation.as_str(),
            desired_image: request.desired_image.as_str(),
            desired_config: &request.desired_config,
            compute_provider: request.compute_provider.as_str(),
            metadata: &request.metadata,
        };

        let response = self
            .http_client
            .post(self.url(format!("/workflows/{workflow_id}/executions").as_str()))
            .header("idempotency-key", request.execution_name.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|error| Self::transport_failure("workflow invocation", error))?;

        if !response.status().is_success() {
            return Err(Self::read_failure("workflow invocation", response).await);
        }

        let body = response
            .json::<InvokeResponseBody>()
            .await
            .map_err(|error| {
                AppError::ProviderUnavailable(format!(
                    "workflow invocation returned an unreadable body: {error}"
                ))
            })?;

        debug!(
            execution_name = %request.execution_name,
            execution_id = %body.execution_id,
            deduplicated = body.deduplicated,
            "restate invocation accepted"
        );

        Ok(InvokeWorkflowResponse {
            execution_id: body.execution_id,
            state: ExecutionState::parse(body.state.as_str())?,
            started_at: body.started_at,
            deduplicated: body.deduplicated,
        })
    }

    async fn get_execution_status(
        &self,
        execution_id: &str,
    ) -> AppResult<WorkflowExecutionStatus> {
        let response = self
            .http_client
            .get(self.url(format!("/executions/{execution_id}").as_str()))
            .send()
            .await
            .map_err(|error| Self::transport_failure("execution status poll", error))?;

        if !response.status().is_success() {
            return Err(Self::read_failure("execution status poll", response).await);
        }

        let body = response
            .json::<ExecutionStatusBody>()
            .await
            .map_err(|error| {
                AppError::ProviderUnavailable(format!(
                    "execution status poll returned an unreadable body: {error}"
                ))
            })?;

        execution_status_from_body(body)
    }

    async fn stop_execution(&self, execution_id: &str, reason: &str) -> AppResult<()> {
        let response = self
            .http_client
            .post(self.url(format!("/executions/{execution_id}/stop").as_str()))
            .json(&serde_json::json!({ "reason": reason }))
            .send()
            .await
            .map_err(|error| Self::transport_failure("execution stop", error))?;

        if !response.status().is_success() {
            return Err(Self::read_failure("execution stop", response).await);
        }

        Ok(())
    }

    async fn delete_workflow(&self, workflow_id: &str) -> AppResult<()> {
        let response = self
            .http_client
            .delete(self.url(format!("/workflows/{workflow_id}").as_str()))
            .send()
            .await
            .map_err(|error| Self::transport_failure("workflow deletion", error))?;

        if !response.status().is_success() {
            return Err(Self::read_failure("workflow deletion", response).await);
        }

        Ok(())
    }

    async fn validate(&self, spec: &WorkflowSpec) -> AppResult<()> {
        let response = self
            .http_client
            .post(self.url("/workflows/validate"))
            .json(&serde_json::json!({
                "workflow_id": spec.workflow_id,
                "definition": spec.definition,
            }))
            .send()
            .await
            .map_err(|error| Self::transport_failure("workflow validation", error))?;

        if !response.status().is_success() {
            return Err(Self::read_failure("workflow validation", response).await);
        }

        Ok(())
    }

    async fn post_compute_callback(&self, execution_id: &str, payload: Value) -> AppResult<()> {
        let response = self
            .http_client
            .post(self.url(format!("/executions/{execution_id}/compute-callback").as_str()))
            .json(&payload)
            .send()
            .await
            .map_err(|error| Self::transport_failure("compute callback", error))?;

        if !response.status().is_success() {
            return Err(Self::read_failure("compute callback", response).await);
        }

        Ok(())
    }
}
