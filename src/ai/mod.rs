// src/ai/mod.rs
pub mod connector;
pub mod local_model;
pub mod openai;
pub mod reply;

use anyhow::Result;
use log::{info, warn};

use crate::config::{PluginConfig, ProviderKind, DEFAULT_OLLAMA_URL};
use connector::LlmConnector;
use local_model::LocalModel;
use openai::OpenAiCompatible;

/// Configured LLM providers, kept in configuration order. The first one is
/// the default.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn LlmConnector>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: LlmConnector + 'static>(&mut self, connector: C) {
        self.providers.push(Box::new(connector));
    }

    /// Build connectors for every provider in `cfg`. `ollama_host` is used for
    /// Ollama entries without a base URL.
    pub fn from_config(cfg: &PluginConfig, ollama_host: Option<&str>) -> Result<Self> {
        let mut registry = Self::new();
        for provider in &cfg.providers {
            match provider.kind {
                ProviderKind::Ollama => {
                    let url = provider
                        .base_url
                        .as_deref()
                        .or(ollama_host)
                        .unwrap_or(DEFAULT_OLLAMA_URL);
                    registry.register(LocalModel::new(&provider.id, url, provider.model.as_deref())?);
                }
                ProviderKind::OpenAi => {
                    let Some(url) = provider.base_url.as_deref() else {
                        warn!("Provider '{}' has no base_url, skipping", provider.id);
                        continue;
                    };
                    registry.register(OpenAiCompatible::new(
                        &provider.id,
                        url,
                        provider.api_key.as_deref(),
                        provider.model.as_deref(),
                    )?);
                }
            }
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&dyn LlmConnector> {
        self.providers
            .iter()
            .find(|provider| provider.id() == id)
            .map(|provider| provider.as_ref())
    }

    pub fn default_provider(&self) -> Option<&dyn LlmConnector> {
        self.providers.first().map(|provider| provider.as_ref())
    }

    /// The provider named by `provider_id`, falling back to the default
    pub fn select(&self, provider_id: &str) -> Option<&dyn LlmConnector> {
        let requested = provider_id.trim();
        if !requested.is_empty() {
            if let Some(provider) = self.get(requested) {
                return Some(provider);
            }
            warn!("Provider '{}' not configured, using default", requested);
        }
        let provider = self.default_provider();
        if let Some(provider) = provider {
            info!("Using provider '{}'", provider.id());
        }
        provider
    }

    pub fn ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector::ChatRequest;
    use serde_json::{json, Value};

    struct Named(&'static str);

    impl LlmConnector for Named {
        fn id(&self) -> &str {
            self.0
        }

        fn text_chat(&self, _request: &ChatRequest) -> Result<Value> {
            Ok(json!({ "text": self.0 }))
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Named("first"));
        registry.register(Named("second"));
        registry
    }

    #[test]
    fn select_by_id() {
        assert_eq!(registry().select("second").map(|p| p.id()), Some("second"));
    }

    #[test]
    fn blank_or_unknown_id_uses_default() {
        let registry = registry();
        assert_eq!(registry.select("").map(|p| p.id()), Some("first"));
        assert_eq!(registry.select("  ").map(|p| p.id()), Some("first"));
        assert_eq!(registry.select("missing").map(|p| p.id()), Some("first"));
    }

    #[test]
    fn empty_registry_selects_nothing() {
        assert!(ProviderRegistry::new().select("any").is_none());
    }

    #[test]
    fn from_config_keeps_order_and_skips_incomplete_entries() -> Result<()> {
        let cfg = PluginConfig::from_json(
            r#"{"providers": [
                {"id": "remote", "kind": "openai", "base_url": "http://remote"},
                {"id": "broken", "kind": "openai"},
                {"id": "local", "kind": "ollama"}
            ]}"#,
        )?;
        let registry = ProviderRegistry::from_config(&cfg, Some("http://ollama:11434"))?;
        assert_eq!(registry.ids(), vec!["remote", "local"]);
        Ok(())
    }
}
