use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use landlord_core::{AppError, AppResult};

use super::provider::WorkflowProvider;

/// Name-keyed registry of workflow providers, populated at startup before
/// the reconciler runs.
#[derive(Default)]
pub struct WorkflowProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn WorkflowProvider>>>,
}

impl WorkflowProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers one provider under its own name, replacing any previous
    /// registration of that name.
    pub fn register(&self, provider: Arc<dyn WorkflowProvider>) -> AppResult<()> {
        let name = provider.name().to_owned();
        if name.trim().is_empty() {
            return Err(AppError::Validation(
                "workflow provider name must not be empty".to_owned(),
            ));
        }

        let mut providers = self
            .providers
            .write()
            .map_err(|_| AppError::Internal("workflow provider registry lock poisoned".to_owned()))?;
        providers.insert(name, provider);
        Ok(())
    }

    /// Returns the provider registered under `name`.
    pub fn get(&self, name: &str) -> AppResult<Arc<dyn WorkflowProvider>> {
        let providers = self
            .providers
            .read()
            .map_err(|_| AppError::Internal("workflow provider registry lock poisoned".to_owned()))?;
        providers
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("workflow provider '{name}' is not registered")))
    }

    /// Returns registered provider names in sorted order.
    pub fn names(&self) -> AppResult<Vec<String>> {
        let providers = self
            .providers
            .read()
            .map_err(|_| AppError::Internal("workflow provider registry lock poisoned".to_owned()))?;
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
