use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use landlord_core::{AppError, AppResult, TenantId};
use landlord_domain::Tenant;
use serde_json::Value;
use tracing::debug;

use crate::tenant_ports::TenantRepository;

/// Resolves which compute provider a tenant's workflow should target.
///
/// Precedence: static configuration override, cache, then the tenant record
/// (`desired_config.compute_provider`, `desired_config.compute_provider_type`,
/// `labels.compute_provider`, `annotations.compute_provider`). An empty
/// string leaves the choice to the workflow provider's default.
pub struct ComputeProviderResolver {
    repository: Arc<dyn TenantRepository>,
    override_provider: Option<String>,
    cache_ttl: Duration,
    cache: RwLock<HashMap<TenantId, CachedResolution>>,
}

struct CachedResolution {
    provider: String,
    resolved_at: Instant,
}

impl ComputeProviderResolver {
    /// Creates a resolver reading through the given repository.
    #[must_use]
    pub fn new(
        repository: Arc<dyn TenantRepository>,
        override_provider: Option<String>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            override_provider: override_provider.filter(|value| !value.trim().is_empty()),
            cache_ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves the compute provider name for one tenant.
    pub async fn resolve(&self, tenant_id: TenantId) -> AppResult<String> {
        if let Some(provider) = &self.override_provider {
            return Ok(provider.clone());
        }

        if let Some(provider) = self.cached(tenant_id)? {
            return Ok(provider);
        }

        let tenant = self.repository.get_by_id(tenant_id).await?;
        let provider = provider_from_tenant(&tenant).unwrap_or_default();
        debug!(
            tenant_id = %tenant_id,
            provider = %provider,
            "resolved compute provider"
        );

        let mut cache = self
            .cache
            .write()
            .map_err(|_| AppError::Internal("compute provider cache lock poisoned".to_owned()))?;
        cache.insert(
            tenant_id,
            CachedResolution {
                provider: provider.clone(),
                resolved_at: Instant::now(),
            },
        );

        Ok(provider)
    }

    /// Drops the cached resolution for one tenant.
    pub fn invalidate(&self, tenant_id: TenantId) -> AppResult<()> {
        self.cache
            .write()
            .map_err(|_| AppError::Internal("compute provider cache lock poisoned".to_owned()))?
            .remove(&tenant_id);
        Ok(())
    }

    fn cached(&self, tenant_id: TenantId) -> AppResult<Option<String>> {
        let cache = self
            .cache
            .read()
            .map_err(|_| AppError::Internal("compute provider cache lock poisoned".to_owned()))?;
        Ok(cache
            .get(&tenant_id)
            .filter(|entry| entry.resolved_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.provider.clone()))
    }
}

/// Extracts the compute provider name from a tenant record.
#[must_use]
pub fn provider_from_tenant(tenant: &Tenant) -> Option<String> {
    let from_config = |key: &str| {
        tenant
            .desired_config
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    };
    let from_map = |map: &HashMap<String, String>| {
        map.get("compute_provider")
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    };

    from_config("compute_provider")
        .or_else(|| from_config("compute_provider_type"))
        .or_else(|| from_map(&tenant.labels))
        .or_else(|| from_map(&tenant.annotations))
}
