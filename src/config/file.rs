//! File-based configuration loading
//!
//! Loads providers, routing slots and transformer chains from a JSON file

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "ROUTEGATE_CONFIG";

/// Masked placeholder for secrets in sanitized output
pub const MASKED_SECRET: &str = "***";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3456
}

fn default_long_context_threshold() -> u64 {
    60_000
}

/// Application configuration loaded from JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Static key guarding the management API (optional)
    #[serde(rename = "APIKEY", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Listen host (default: "127.0.0.1")
    #[serde(rename = "HOST", default = "default_host")]
    pub host: String,

    /// Listen port (default: 3456)
    #[serde(rename = "PORT", default = "default_port")]
    pub port: u16,

    /// Whether logging is enabled at all
    #[serde(rename = "LOG", default, skip_serializing_if = "Option::is_none")]
    pub log: Option<bool>,

    /// Log level used when RUST_LOG is not set
    #[serde(rename = "LOG_LEVEL", default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Upstream providers
    #[serde(rename = "Providers")]
    pub providers: Vec<ProviderConfig>,

    /// Routing slots
    #[serde(rename = "Router")]
    pub router: RouterConfig,

    /// Custom transformer declarations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformers: Vec<CustomTransformerConfig>,
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name, used in routes
    pub name: String,

    /// Full upstream endpoint (or base URL for transformers that build their own)
    pub api_base_url: String,

    /// Upstream API key
    #[serde(default)]
    pub api_key: String,

    /// Model ids this provider serves
    pub models: Vec<String>,

    /// Transformer chain configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<ProviderTransformerConfig>,
}

impl ProviderConfig {
    pub fn serves(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

/// One transformer chain entry: a bare name or `[name, options]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformerEntry {
    Name(String),
    WithOptions(String, serde_json::Value),
}

impl TransformerEntry {
    pub fn name(&self) -> &str {
        match self {
            TransformerEntry::Name(name) => name,
            TransformerEntry::WithOptions(name, _) => name,
        }
    }

    pub fn options(&self) -> Option<&serde_json::Value> {
        match self {
            TransformerEntry::Name(_) => None,
            TransformerEntry::WithOptions(_, options) => Some(options),
        }
    }
}

/// Provider transformer chains: default list plus per-model overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTransformerConfig", into = "RawTransformerConfig")]
pub struct ProviderTransformerConfig {
    pub default: Vec<TransformerEntry>,
    pub models: BTreeMap<String, Vec<TransformerEntry>>,
}

impl ProviderTransformerConfig {
    /// Chain for a model: its own entry if present, otherwise the provider default
    pub fn chain_for(&self, model: &str) -> &[TransformerEntry] {
        self.models
            .get(model)
            .map(|entries| entries.as_slice())
            .unwrap_or(&self.default)
    }
}

/// Accepted on-disk shapes: `["openai"]` or `{"use": [...], "<model>": {"use": [...]}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTransformerConfig {
    Flat(Vec<TransformerEntry>),
    Keyed {
        #[serde(rename = "use", default)]
        entries: Vec<TransformerEntry>,
        #[serde(flatten)]
        models: BTreeMap<String, ModelTransformerConfig>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelTransformerConfig {
    #[serde(rename = "use", default)]
    entries: Vec<TransformerEntry>,
}

impl From<RawTransformerConfig> for ProviderTransformerConfig {
    fn from(raw: RawTransformerConfig) -> Self {
        match raw {
            RawTransformerConfig::Flat(entries) => Self {
                default: entries,
                models: BTreeMap::new(),
            },
            RawTransformerConfig::Keyed { entries, models } => Self {
                default: entries,
                models: models.into_iter().map(|(k, v)| (k, v.entries)).collect(),
            },
        }
    }
}

impl From<ProviderTransformerConfig> for RawTransformerConfig {
    fn from(config: ProviderTransformerConfig) -> Self {
        RawTransformerConfig::Keyed {
            entries: config.default,
            models: config
                .models
                .into_iter()
                .map(|(k, entries)| (k, ModelTransformerConfig { entries }))
                .collect(),
        }
    }
}

/// Routing slots, each holding a "provider,model" route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Fallback route (required)
    pub default: String,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub think: Option<String>,

    #[serde(
        rename = "longContext",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub long_context: Option<String>,

    #[serde(
        rename = "webSearch",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub web_search: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Token count above which the long-context route applies
    #[serde(rename = "longContextThreshold", default = "default_long_context_threshold")]
    pub long_context_threshold: u64,
}

impl RouterConfig {
    /// Route config with only a default slot
    pub fn with_default(route: impl Into<String>) -> Self {
        Self {
            default: route.into(),
            background: None,
            think: None,
            long_context: None,
            web_search: None,
            image: None,
            long_context_threshold: default_long_context_threshold(),
        }
    }

    /// All configured slots as (slot name, route)
    pub fn slots(&self) -> Vec<(&'static str, &str)> {
        let mut slots = vec![("default", self.default.as_str())];
        let optional = [
            ("background", &self.background),
            ("think", &self.think),
            ("longContext", &self.long_context),
            ("webSearch", &self.web_search),
            ("image", &self.image),
        ];
        for (name, route) in optional {
            if let Some(route) = route {
                slots.push((name, route.as_str()));
            }
        }
        slots
    }
}

/// Treat `""` route slots as unset
fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Custom transformer declaration from the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTransformerConfig {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// Split a "provider,model" route into its parts
pub fn parse_route(route: &str) -> Option<(&str, &str)> {
    let (provider, model) = route.split_once(',')?;
    let (provider, model) = (provider.trim(), model.trim());
    if provider.is_empty() || model.is_empty() {
        return None;
    }
    Some((provider, model))
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_json_str(&content)?;

        debug!("Loaded {} providers", config.providers.len());
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(content)
            .with_context(|| "Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Locate the configuration file
    /// Searches in order:
    /// 1. $ROUTEGATE_CONFIG
    /// 2. ~/.config/routegate/config.json
    /// 3. ./routegate.json
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("routegate").join("config.json");
            if config_path.exists() {
                return Ok(config_path);
            }
        }

        let local_path = PathBuf::from("routegate.json");
        if local_path.exists() {
            return Ok(local_path);
        }

        anyhow::bail!(
            "Configuration file not found. Please create one at:\n\
             - $ROUTEGATE_CONFIG\n\
             - ~/.config/routegate/config.json (recommended)\n\
             - ./routegate.json (current directory)"
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("At least one provider must be configured");
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                anyhow::bail!("Provider name cannot be empty");
            }
            if provider.name.contains(',') {
                anyhow::bail!("Provider name '{}' cannot contain ','", provider.name);
            }
            if !names.insert(provider.name.as_str()) {
                anyhow::bail!("Duplicate provider name '{}'", provider.name);
            }

            if !provider.api_base_url.starts_with("http") {
                anyhow::bail!(
                    "Invalid api_base_url for provider '{}': {}",
                    provider.name,
                    provider.api_base_url
                );
            }

            if provider.models.is_empty() {
                anyhow::bail!(
                    "Provider '{}' must have at least one model configured",
                    provider.name
                );
            }
        }

        if parse_route(&self.router.default).is_none() {
            anyhow::bail!(
                "Router.default must be a 'provider,model' route, got '{}'",
                self.router.default
            );
        }

        // Dangling slots are reported but do not block startup; the router
        // surfaces them per request as routing errors.
        for (slot, route) in self.router.slots() {
            match parse_route(route) {
                Some((provider, model)) => match self.find_provider(provider) {
                    Some(p) if !p.serves(model) => {
                        warn!(
                            "Router.{} references model '{}' not listed by provider '{}'",
                            slot, model, provider
                        );
                    }
                    None => warn!("Router.{} references unknown provider '{}'", slot, provider),
                    _ => {}
                },
                None => warn!("Router.{} is not a 'provider,model' route: '{}'", slot, route),
            }
        }

        Ok(())
    }

    /// Find a provider by name
    pub fn find_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// List all available routes as "provider,model"
    pub fn list_routes(&self) -> Vec<String> {
        self.providers
            .iter()
            .flat_map(|p| p.models.iter().map(move |m| format!("{},{}", p.name, m)))
            .collect()
    }

    /// Config as JSON with every secret replaced by `***`
    pub fn sanitized(&self) -> serde_json::Value {
        let mut copy = self.clone();
        if copy.api_key.as_deref().map(|k| !k.is_empty()).unwrap_or(false) {
            copy.api_key = Some(MASKED_SECRET.to_string());
        }
        for provider in &mut copy.providers {
            if !provider.api_key.is_empty() {
                provider.api_key = MASKED_SECRET.to_string();
            }
        }
        serde_json::to_value(&copy).unwrap_or(serde_json::Value::Null)
    }
}
