use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use landlord_core::TenantId;

use crate::dto::{
    CreateTenantRequest, TenantListParams, TenantResponse, TransitionResponse,
    UpdateTenantRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// Accepts a new tenant in the `requested` status.
pub async fn create_tenant_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<TenantResponse>)> {
    let tenant = state.tenant_service.create_tenant(request.into()).await?;
    Ok((StatusCode::CREATED, Json(tenant.into())))
}

/// Lists tenants matching the query parameters.
pub async fn list_tenants_handler(
    State(state): State<AppState>,
    Query(params): Query<TenantListParams>,
) -> ApiResult<Json<Vec<TenantResponse>>> {
    let query = params.into_query()?;
    let tenants = state.tenant_service.list_tenants(query).await?;
    Ok(Json(tenants.into_iter().map(TenantResponse::from).collect()))
}

/// Returns one tenant by identifier.
pub async fn get_tenant_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<TenantResponse>> {
    let tenant_id = TenantId::parse(tenant_id.as_str())?;
    let tenant = state.tenant_service.get_tenant(tenant_id).await?;
    Ok(Json(tenant.into()))
}

/// Returns one tenant by unique name.
pub async fn get_tenant_by_name_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TenantResponse>> {
    let tenant = state.tenant_service.get_tenant_by_name(name.as_str()).await?;
    Ok(Json(tenant.into()))
}

/// Replaces the desired state of a ready tenant.
pub async fn update_tenant_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(request): Json<UpdateTenantRequest>,
) -> ApiResult<Json<TenantResponse>> {
    let tenant_id = TenantId::parse(tenant_id.as_str())?;
    let tenant = state
        .tenant_service
        .update_tenant(tenant_id, request.into())
        .await?;
    Ok(Json(tenant.into()))
}

/// Moves a tenant into `archiving`.
pub async fn archive_tenant_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<TenantResponse>> {
    let tenant_id = TenantId::parse(tenant_id.as_str())?;
    let tenant = state.tenant_service.archive_tenant(tenant_id).await?;
    Ok(Json(tenant.into()))
}

/// Moves an archived tenant into `deleting`.
pub async fn delete_tenant_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<TenantResponse>> {
    let tenant_id = TenantId::parse(tenant_id.as_str())?;
    let tenant = state.tenant_service.delete_tenant(tenant_id).await?;
    Ok(Json(tenant.into()))
}

/// Returns the transition history for one tenant.
pub async fn list_transitions_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<Vec<TransitionResponse>>> {
    let tenant_id = TenantId::parse(tenant_id.as_str())?;
    let history = state.tenant_service.get_history(tenant_id).await?;
    Ok(Json(
        history.into_iter().map(TransitionResponse::from).collect(),
    ))
}
