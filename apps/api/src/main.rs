//! Landlord API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod dto;
mod error;
mod handlers;
mod state;

use std::sync::Arc;

use landlord_application::TenantService;
use landlord_core::AppError;
use landlord_infrastructure::PostgresTenantRepository;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    api_config::init_tracing();

    let config = api_config::ApiConfig::load()?;
    let pool = connect_and_migrate(config.database_url.as_str()).await?;
    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let repository = Arc::new(PostgresTenantRepository::new(pool));
    let app_state = AppState {
        tenant_service: TenantService::new(repository),
    };
    let app = api_router::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_address.as_str())
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(address = %config.listen_address, "landlord-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}

async fn connect_and_migrate(database_url: &str) -> Result<sqlx::PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}
