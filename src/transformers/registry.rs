//! Transformer registry
//!
//! Holds the built-in transformers plus custom ones registered at startup and
//! resolves the ordered chain for a (provider, model) pair. The registry is
//! immutable once built and shared through `Arc`.

use super::{
    DeepSeekTransformer, GeminiTransformer, MaxTokenTransformer, OpenAITransformer, Transformer,
    TransformerCapabilities, TransformerContext,
};
use crate::config::{CustomTransformerConfig, ProviderConfig};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A chain entry resolved to its transformer and entry options
#[derive(Clone)]
pub struct ResolvedTransformer {
    pub transformer: Arc<dyn Transformer>,
    pub options: Option<Value>,
}

impl ResolvedTransformer {
    pub fn name(&self) -> &str {
        self.transformer.name()
    }

    /// Context for invoking this entry against a routed provider/model
    pub fn context(&self, provider: &str, model: &str) -> TransformerContext {
        TransformerContext::new(provider, model).with_config(self.options.clone())
    }
}

impl std::fmt::Debug for ResolvedTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTransformer")
            .field("name", &self.transformer.name())
            .field("options", &self.options)
            .finish()
    }
}

/// Listing entry for the management API
#[derive(Debug, Clone, Serialize)]
pub struct TransformerInfo {
    pub name: String,
    #[serde(flatten)]
    pub capabilities: TransformerCapabilities,
    pub custom: bool,
}

type TransformerMap = HashMap<String, Arc<dyn Transformer>>;

pub struct TransformerRegistry {
    builtin: TransformerMap,
    custom: TransformerMap,
}

/// Builder collecting custom transformers before the registry is frozen
#[derive(Default)]
pub struct TransformerRegistryBuilder {
    custom: TransformerMap,
}

impl TransformerRegistryBuilder {
    /// Register a custom transformer; it shadows a built-in of the same name
    pub fn register_custom(mut self, transformer: Arc<dyn Transformer>) -> Self {
        let name = transformer.name().to_string();
        if self.custom.insert(name.clone(), transformer).is_some() {
            warn!("Custom transformer '{}' registered twice, keeping the last one", name);
        }
        self
    }

    /// Report config-declared transformer modules, which cannot be loaded at runtime
    pub fn declare_from_config(self, entries: &[CustomTransformerConfig]) -> Self {
        for entry in entries {
            warn!(
                "Ignoring transformer module '{}': dynamic loading is not supported, register it in code instead",
                entry.path
            );
        }
        self
    }

    pub fn build(self) -> TransformerRegistry {
        let mut builtin: TransformerMap = HashMap::new();
        let transformers: [Arc<dyn Transformer>; 4] = [
            Arc::new(OpenAITransformer::new()),
            Arc::new(DeepSeekTransformer::new()),
            Arc::new(GeminiTransformer::new()),
            Arc::new(MaxTokenTransformer::new()),
        ];
        for transformer in transformers {
            builtin.insert(transformer.name().to_string(), transformer);
        }

        for name in self.custom.keys() {
            if builtin.contains_key(name) {
                info!("Custom transformer '{}' shadows the built-in one", name);
            }
        }

        TransformerRegistry {
            builtin,
            custom: self.custom,
        }
    }
}

impl TransformerRegistry {
    pub fn builder() -> TransformerRegistryBuilder {
        TransformerRegistryBuilder::default()
    }

    /// Registry with only the built-in transformers
    pub fn with_builtins() -> Self {
        Self::builder().build()
    }

    /// Look up a transformer by name, custom first
    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        self.custom.get(name).or_else(|| self.builtin.get(name)).cloned()
    }

    /// Resolve the chain for a provider/model pair.
    /// The model-specific list wins over the provider default; no config means
    /// an empty (pass-through) chain.
    pub fn get_transformers(
        &self,
        provider: &ProviderConfig,
        model: &str,
    ) -> Vec<ResolvedTransformer> {
        let entries = match &provider.transformer {
            Some(config) => config.chain_for(model),
            None => return Vec::new(),
        };

        let chain: Vec<ResolvedTransformer> = entries
            .iter()
            .filter_map(|entry| match self.get(entry.name()) {
                Some(transformer) => Some(ResolvedTransformer {
                    transformer,
                    options: entry.options().cloned(),
                }),
                None => {
                    warn!(
                        "Unknown transformer '{}' configured for provider '{}', skipping",
                        entry.name(),
                        provider.name
                    );
                    None
                }
            })
            .collect();

        debug!(
            "Resolved transformer chain for {},{}: [{}]",
            provider.name,
            model,
            chain.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
        );
        chain
    }

    /// Sorted, de-duplicated names across both namespaces
    pub fn list_transformers(&self) -> Vec<String> {
        self.builtin
            .keys()
            .chain(self.custom.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Names with capability flags, in listing order
    pub fn describe(&self) -> Vec<TransformerInfo> {
        self.list_transformers()
            .into_iter()
            .filter_map(|name| {
                let transformer = self.get(&name)?;
                Some(TransformerInfo {
                    capabilities: transformer.capabilities(),
                    custom: self.custom.contains_key(&name),
                    name,
                })
            })
            .collect()
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
