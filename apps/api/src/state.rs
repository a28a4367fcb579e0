use landlord_application::TenantService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// API-facing tenant writes and reads.
    pub tenant_service: TenantService,
}
