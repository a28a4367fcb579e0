use std::env;

use landlord_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

/// API process configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Socket address the HTTP listener binds.
    pub listen_address: String,
    /// Apply migrations and exit without serving.
    pub migrate_only: bool,
}

impl ApiConfig {
    /// Loads and validates the configuration.
    pub fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let listen_address =
            env::var("API_LISTEN_ADDRESS").unwrap_or_else(|_| "127.0.0.1:3000".to_owned());
        let migrate_only = env::var("MIGRATE_ONLY")
            .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            listen_address,
            migrate_only,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}
