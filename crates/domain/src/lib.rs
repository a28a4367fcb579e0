//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod config_hash;
mod execution;
mod state_machine;
mod tenant;

pub use config_hash::{compute_config_hash, compute_config_hash_value};
pub use execution::{
    DerivedSubState, ExecutionError, ExecutionHistoryEvent, ExecutionState, WorkflowExecutionStatus,
    WorkflowSubState, derive_sub_state,
};
pub use state_machine::{
    ReconcileAction, action_for_status, allowed_transitions, execution_name, status_for_action,
    success_status, validate_transition,
};
pub use tenant::{NewTenantInput, StateTransition, Tenant, TenantStatus, TriggerSource};
