//! Landlord reconciliation controller runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use landlord_application::{
    ComputeProviderResolver, ControllerMetrics, RateLimitedQueue, Reconciler, ReconcilerConfig,
    TenantRepository, WorkflowClient, WorkflowProviderRegistry,
};
use landlord_core::{AppError, AppResult};
use landlord_infrastructure::{
    MockWorkflowProvider, PostgresTenantRepository, RestateProviderConfig,
    RestateWorkflowProvider,
};
use prometheus::TextEncoder;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct ControllerConfig {
    database_url: String,
    workflow_provider: String,
    workflow_id: String,
    restate_base_url: Option<String>,
    compute_provider_override: Option<String>,
    compute_provider_cache_ttl: Duration,
    metrics_listen_address: String,
    reconciler: ReconcilerConfig,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ControllerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let repository: Arc<dyn TenantRepository> = Arc::new(PostgresTenantRepository::new(pool));

    let registry = build_provider_registry(&config)?;
    let resolver = Arc::new(ComputeProviderResolver::new(
        repository.clone(),
        config.compute_provider_override.clone(),
        config.compute_provider_cache_ttl,
    ));

    let prometheus_registry = prometheus::Registry::new();
    let metrics = Arc::new(ControllerMetrics::new()?);
    metrics.register_on(&prometheus_registry)?;

    let workflow_client = Arc::new(WorkflowClient::new(
        registry,
        config.workflow_provider.clone(),
        config.workflow_id.clone(),
        resolver,
        metrics.clone(),
    ));
    let queue = RateLimitedQueue::new();
    let reconciler = Arc::new(Reconciler::new(
        repository,
        workflow_client,
        queue,
        metrics,
        config.reconciler.clone(),
    ));

    info!(
        workflow_provider = %config.workflow_provider,
        workflow_id = %config.workflow_id,
        workers = config.reconciler.workers,
        interval_seconds = config.reconciler.reconciliation_interval.as_secs(),
        metrics_listen_address = %config.metrics_listen_address,
        "landlord-controller started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_metrics_server(
        config.metrics_listen_address.clone(),
        prometheus_registry,
        shutdown_rx.clone(),
    )
    .await?;

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    reconciler.run(shutdown_rx).await;
    Ok(())
}

impl ControllerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let workflow_provider = env::var("WORKFLOW_PROVIDER")
            .unwrap_or_else(|_| "mock".to_owned())
            .trim()
            .to_lowercase();
        let workflow_id = env::var("WORKFLOW_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "tenant-provisioner".to_owned());
        let restate_base_url = env::var("RESTATE_BASE_URL")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let compute_provider_override = env::var("COMPUTE_PROVIDER_OVERRIDE")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let compute_provider_cache_ttl =
            Duration::from_secs(parse_env_u64("COMPUTE_PROVIDER_CACHE_TTL_SECONDS", 300)?);
        let metrics_listen_address = env::var("METRICS_LISTEN_ADDRESS")
            .unwrap_or_else(|_| "127.0.0.1:9090".to_owned());

        let workers = parse_env_usize("RECONCILER_WORKERS", 3)?;
        let reconciliation_interval =
            Duration::from_secs(parse_env_u64("RECONCILIATION_INTERVAL_SECONDS", 10)?);
        let workflow_trigger_timeout =
            Duration::from_secs(parse_env_u64("WORKFLOW_TRIGGER_TIMEOUT_SECONDS", 30)?);
        let shutdown_timeout =
            Duration::from_secs(parse_env_u64("SHUTDOWN_TIMEOUT_SECONDS", 30)?);
        let max_retries = parse_env_u32("RECONCILER_MAX_RETRIES", 5)?;
        let stop_poll_timeout =
            Duration::from_secs(parse_env_u64("STOP_POLL_TIMEOUT_SECONDS", 30)?);

        if workers == 0 {
            return Err(AppError::Validation(
                "RECONCILER_WORKERS must be greater than zero".to_owned(),
            ));
        }

        if reconciliation_interval.is_zero() {
            return Err(AppError::Validation(
                "RECONCILIATION_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if workflow_provider == "restate" && restate_base_url.is_none() {
            return Err(AppError::Validation(
                "RESTATE_BASE_URL is required when WORKFLOW_PROVIDER=restate".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            workflow_provider,
            workflow_id,
            restate_base_url,
            compute_provider_override,
            compute_provider_cache_ttl,
            metrics_listen_address,
            reconciler: ReconcilerConfig {
                reconciliation_interval,
                workers,
                workflow_trigger_timeout,
                shutdown_timeout,
                max_retries,
                stop_poll_timeout,
                ..ReconcilerConfig::default()
            },
        })
    }
}

fn build_provider_registry(
    config: &ControllerConfig,
) -> AppResult<Arc<WorkflowProviderRegistry>> {
    let registry = Arc::new(WorkflowProviderRegistry::new());
    registry.register(Arc::new(MockWorkflowProvider::new()))?;

    if let Some(base_url) = &config.restate_base_url {
        let http_client = reqwest::Client::builder()
            .timeout(config.reconciler.workflow_trigger_timeout)
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build HTTP client: {error}"))
            })?;
        registry.register(Arc::new(RestateWorkflowProvider::new(
            http_client,
            RestateProviderConfig::new(base_url.as_str())?,
        )))?;
    }

    // Fail fast when the configured provider name is not registered.
    registry.get(config.workflow_provider.as_str())?;
    Ok(registry)
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn spawn_metrics_server(
    listen_address: String,
    registry: prometheus::Registry,
    mut shutdown: watch::Receiver<bool>,
) -> AppResult<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind(listen_address.as_str())
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to bind metrics listener: {error}"))
        })?;

    tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    return;
                }
            }
        });
        if let Err(error) = serve.await {
            warn!(error = %error, "metrics server error");
        }
    });

    Ok(())
}

async fn metrics_handler(
    State(registry): State<prometheus::Registry>,
) -> Result<String, StatusCode> {
    let mut body = String::new();
    TextEncoder::new()
        .encode_utf8(&registry.gather(), &mut body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(body)
}

async fn healthz_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

fn init_tracing() {
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

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
