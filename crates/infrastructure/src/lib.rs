//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_tenant_repository;
mod mock_workflow_provider;
mod postgres_tenant_repository;
mod restate_workflow_provider;

pub use in_memory_tenant_repository::InMemoryTenantRepository;
pub use mock_workflow_provider::MockWorkflowProvider;
pub use postgres_tenant_repository::PostgresTenantRepository;
pub use restate_workflow_provider::{RestateProviderConfig, RestateWorkflowProvider};
