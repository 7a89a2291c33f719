use std::collections::HashMap;
use std::sync::Arc;
use switchyard_config::Config;
use thiserror::Error;

use crate::{ClaudeCliAdapter, CommandAdapter, GeminiCliAdapter, ProviderAdapter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unsupported adapter '{adapter}' for provider '{provider}'")]
    Unsupported { provider: String, adapter: String },
}

/// Construct the built-in adapter for an adapter kind.
pub fn construct_adapter(kind: &str) -> Option<Arc<dyn ProviderAdapter>> {
    match kind {
        "claude-cli" => Some(Arc::new(ClaudeCliAdapter)),
        "gemini-cli" => Some(Arc::new(GeminiCliAdapter)),
        "command" => Some(Arc::new(CommandAdapter)),
        _ => None,
    }
}

/// Provider name to adapter mapping.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every configured provider section.
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (name, section) in &config.providers {
            let kind = section.adapter_kind(name);
            let adapter = construct_adapter(&kind).ok_or_else(|| RegistryError::Unsupported {
                provider: name.clone(),
                adapter: kind.clone(),
            })?;
            registry.register(name.clone(), adapter);
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(provider.into(), adapter);
    }

    #[must_use]
    pub fn with_adapter(
        mut self,
        provider: impl Into<String>,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Self {
        self.register(provider, adapter);
        self
    }

    #[must_use]
    pub fn get(&self, provider: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).cloned()
    }

    #[must_use]
    pub fn contains(&self, provider: &str) -> bool {
        self.adapters.contains_key(provider)
    }
}
