//! Tenant lifecycle rules encoded as data.
//!
//! Both the API layer and the reconciler validate against the same
//! transition table; checks are never duplicated in handlers.

use landlord_core::{AppError, AppResult, TenantId};

use crate::tenant::TenantStatus;

/// Workflow action the reconciler runs to progress a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileAction {
    /// Dry-run planning pass.
    Plan,
    /// Initial provisioning.
    Provision,
    /// In-place update of a ready tenant.
    Update,
    /// Release compute, keep the record.
    Archive,
    /// Tear down and retire the record.
    Delete,
}

impl ReconcileAction {
    /// Returns the action label embedded in execution names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Provision => "provision",
            Self::Update => "update",
            Self::Archive => "archive",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ReconcileAction {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Returns the statuses reachable from `from` in one transition.
#[must_use]
pub fn allowed_transitions(from: TenantStatus) -> &'static [TenantStatus] {
    match from {
        TenantStatus::Requested => &[
            TenantStatus::Planning,
            TenantStatus::Provisioning,
            TenantStatus::Failed,
        ],
        TenantStatus::Planning => &[TenantStatus::Provisioning, TenantStatus::Failed],
        TenantStatus::Provisioning => &[TenantStatus::Ready, TenantStatus::Failed],
        TenantStatus::Ready => &[
            TenantStatus::Updating,
            TenantStatus::Archiving,
            TenantStatus::Deleting,
        ],
        TenantStatus::Updating => &[TenantStatus::Ready, TenantStatus::Failed],
        TenantStatus::Archiving => &[TenantStatus::Archived, TenantStatus::Failed],
        TenantStatus::Deleting => &[TenantStatus::Archived, TenantStatus::Failed],
        TenantStatus::Failed => &[TenantStatus::Deleting, TenantStatus::Archiving],
        TenantStatus::Archived => &[TenantStatus::Deleting],
    }
}

/// Validates one status change against the transition table.
pub fn validate_transition(from: TenantStatus, to: TenantStatus) -> AppResult<()> {
    if allowed_transitions(from).contains(&to) {
        return Ok(());
    }

    Err(AppError::InvalidTransition(format!(
        "tenant status cannot move from '{from}' to '{to}'"
    )))
}

/// Returns the action required to progress a tenant, or `None` when the
/// status is terminal for reconciliation purposes.
#[must_use]
pub fn action_for_status(status: TenantStatus) -> Option<ReconcileAction> {
    match status {
        TenantStatus::Requested | TenantStatus::Planning | TenantStatus::Provisioning => {
            Some(ReconcileAction::Provision)
        }
        TenantStatus::Updating => Some(ReconcileAction::Update),
        TenantStatus::Archiving => Some(ReconcileAction::Archive),
        TenantStatus::Deleting => Some(ReconcileAction::Delete),
        TenantStatus::Ready | TenantStatus::Archived | TenantStatus::Failed => None,
    }
}

/// Returns the status a tenant enters when `action` is triggered from
/// `current`.
///
/// Re-triggering an action whose target status is already current is a
/// no-op; any other pair not present in the transition table fails.
pub fn status_for_action(
    action: ReconcileAction,
    current: TenantStatus,
) -> AppResult<TenantStatus> {
    let target = match action {
        ReconcileAction::Plan => TenantStatus::Planning,
        ReconcileAction::Provision => TenantStatus::Provisioning,
        ReconcileAction::Update => TenantStatus::Updating,
        ReconcileAction::Archive => TenantStatus::Archiving,
        ReconcileAction::Delete => TenantStatus::Deleting,
    };

    if target == current {
        return Ok(target);
    }

    validate_transition(current, target)?;
    Ok(target)
}

/// Returns where a succeeded workflow lands the tenant, or `None` when no
/// workflow outcome applies to the status.
#[must_use]
pub fn success_status(status: TenantStatus) -> Option<TenantStatus> {
    match status {
        TenantStatus::Planning => Some(TenantStatus::Provisioning),
        TenantStatus::Provisioning | TenantStatus::Updating => Some(TenantStatus::Ready),
        TenantStatus::Archiving | TenantStatus::Deleting => Some(TenantStatus::Archived),
        TenantStatus::Requested
        | TenantStatus::Ready
        | TenantStatus::Archived
        | TenantStatus::Failed => None,
    }
}

/// Builds the deterministic execution name providers use to collapse
/// duplicate invocations.
#[must_use]
pub fn execution_name(tenant_id: TenantId, action: ReconcileAction) -> String {
    format!("tenant-{tenant_id}-{action}")
}

#[cfg(test)]
mod tests {
    use landlord_core::TenantId;

    use super::{
        ReconcileAction, action_for_status, allowed_transitions, execution_name, status_for_action,
        success_status, validate_transition,
    };
    use crate::tenant::TenantStatus;

    #[test]
    fn transition_table_matches_lifecycle() {
        let valid = [
            (TenantStatus::Requested, TenantStatus::Planning),
            (TenantStatus::Requested, TenantStatus::Provisioning),
            (TenantStatus::Requested, TenantStatus::Failed),
            (TenantStatus::Planning, TenantStatus::Provisioning),
            (TenantStatus::Provisioning, TenantStatus::Ready),
            (TenantStatus::Ready, TenantStatus::Updating),
            (TenantStatus::Ready, TenantStatus::Archiving),
            (TenantStatus::Ready, TenantStatus::Deleting),
            (TenantStatus::Updating, TenantStatus::Ready),
            (TenantStatus::Archiving, TenantStatus::Archived),
            (TenantStatus::Deleting, TenantStatus::Archived),
            (TenantStatus::Failed, TenantStatus::Deleting),
            (TenantStatus::Failed, TenantStatus::Archiving),
            (TenantStatus::Archived, TenantStatus::Deleting),
        ];
        for (from, to) in valid {
            assert!(
                validate_transition(from, to).is_ok(),
                "expected {from} -> {to} to be valid"
            );
        }
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let invalid = [
            (TenantStatus::Ready, TenantStatus::Requested),
            (TenantStatus::Ready, TenantStatus::Failed),
            (TenantStatus::Archived, TenantStatus::Ready),
            (TenantStatus::Failed, TenantStatus::Ready),
            (TenantStatus::Requested, TenantStatus::Ready),
            (TenantStatus::Provisioning, TenantStatus::Updating),
        ];
        for (from, to) in invalid {
            assert!(
                validate_transition(from, to).is_err(),
                "expected {from} -> {to} to be invalid"
            );
        }
    }

    #[test]
    fn terminal_statuses_require_no_action() {
        assert!(action_for_status(TenantStatus::Ready).is_none());
        assert!(action_for_status(TenantStatus::Archived).is_none());
        assert!(action_for_status(TenantStatus::Failed).is_none());
    }

    #[test]
    fn requested_tenants_provision() {
        assert_eq!(
            action_for_status(TenantStatus::Requested),
            Some(ReconcileAction::Provision)
        );
        assert_eq!(
            action_for_status(TenantStatus::Planning),
            Some(ReconcileAction::Provision)
        );
        assert_eq!(
            action_for_status(TenantStatus::Updating),
            Some(ReconcileAction::Update)
        );
        assert_eq!(
            action_for_status(TenantStatus::Deleting),
            Some(ReconcileAction::Delete)
        );
    }

    #[test]
    fn status_for_action_is_idempotent_on_in_flight_statuses() {
        let provisioning =
            status_for_action(ReconcileAction::Provision, TenantStatus::Provisioning);
        assert!(provisioning.is_ok());
        assert_eq!(
            provisioning.unwrap_or(TenantStatus::Failed),
            TenantStatus::Provisioning
        );

        let updating = status_for_action(ReconcileAction::Update, TenantStatus::Updating);
        assert!(updating.is_ok());
    }

    #[test]
    fn status_for_action_rejects_pairs_outside_the_table() {
        assert!(status_for_action(ReconcileAction::Update, TenantStatus::Requested).is_err());
        assert!(status_for_action(ReconcileAction::Plan, TenantStatus::Ready).is_err());
    }

    #[test]
    fn success_status_follows_the_table() {
        assert_eq!(
            success_status(TenantStatus::Provisioning),
            Some(TenantStatus::Ready)
        );
        assert_eq!(
            success_status(TenantStatus::Deleting),
            Some(TenantStatus::Archived)
        );
        assert_eq!(
            success_status(TenantStatus::Archiving),
            Some(TenantStatus::Archived)
        );
        assert!(success_status(TenantStatus::Ready).is_none());
    }

    #[test]
    fn execution_names_are_deterministic() {
        let tenant_id = TenantId::new();
        assert_eq!(
            execution_name(tenant_id, ReconcileAction::Provision),
            format!("tenant-{tenant_id}-provision")
        );
        assert_eq!(
            execution_name(tenant_id, ReconcileAction::Provision),
            execution_name(tenant_id, ReconcileAction::Provision)
        );
    }

    #[test]
    fn every_allowed_transition_validates() {
        for from in TenantStatus::all() {
            for to in allowed_transitions(*from) {
                assert!(validate_transition(*from, *to).is_ok());
            }
        }
    }
}
