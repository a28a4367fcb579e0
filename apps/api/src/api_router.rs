use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the HTTP route table.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/api/tenants",
            get(handlers::tenants::list_tenants_handler)
                .post(handlers::tenants::create_tenant_handler),
        )
        .route(
            "/api/tenants/by-name/{name}",
            get(handlers::tenants::get_tenant_by_name_handler),
        )
        .route(
            "/api/tenants/{tenant_id}",
            get(handlers::tenants::get_tenant_handler)
                .put(handlers::tenants::update_tenant_handler)
                .delete(handlers::tenants::delete_tenant_handler),
        )
        .route(
            "/api/tenants/{tenant_id}/archive",
            post(handlers::tenants::archive_tenant_handler),
        )
        .route(
            "/api/tenants/{tenant_id}/transitions",
            get(handlers::tenants::list_transitions_handler),
        )
        .route("/healthz", get(handlers::health::healthz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
