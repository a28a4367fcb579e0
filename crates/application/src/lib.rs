//! Application services and ports.

#![forbid(unsafe_code)]

mod compute_resolver;
mod metrics;
mod reconciler;
mod tenant_ports;
mod tenant_service;
mod work_queue;
mod workflow_client;
mod workflow_ports;

#[cfg(test)]
mod test_support;

pub use compute_resolver::ComputeProviderResolver;
pub use metrics::ControllerMetrics;
pub use reconciler::{Reconciler, ReconcilerConfig};
pub use tenant_ports::{TenantListQuery, TenantRepository};
pub use tenant_service::{CreateTenantInput, TenantService, UpdateTenantInput};
pub use work_queue::RateLimitedQueue;
pub use workflow_client::WorkflowClient;
pub use workflow_ports::{
    InvokeWorkflowRequest, InvokeWorkflowResponse, WorkflowProvider, WorkflowProviderRegistry,
    WorkflowSpec,
};
