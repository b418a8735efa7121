//! Routing engine
//!
//! Picks the (provider, model) pair serving a request from an explicit
//! `"provider,model"` override or from the configured routing slots.

use crate::config::{parse_route, ProviderConfig, RouterConfig};
use crate::models::claude::ClaudeRequest;
use crate::services::tokenizer::{TokenCountError, TokenCounter};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Tool-name prefix marking a web-search capable request
const WEB_SEARCH_TOOL_PREFIX: &str = "web_search";

/// Routing errors
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("Model '{model}' is not available on provider '{provider}'")]
    ModelNotAvailable { provider: String, model: String },

    #[error("Invalid route '{0}', expected 'provider,model'")]
    InvalidRoute(String),

    #[error("Token counting failed: {0}")]
    TokenCounting(#[from] TokenCountError),
}

/// Which rule selected the route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    Override,
    LongContext,
    Background,
    WebSearch,
    Think,
    Default,
}

impl RouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteReason::Override => "override",
            RouteReason::LongContext => "longContext",
            RouteReason::Background => "background",
            RouteReason::WebSearch => "webSearch",
            RouteReason::Think => "think",
            RouteReason::Default => "default",
        }
    }
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request routing state, never persisted
#[derive(Debug, Clone)]
pub struct RoutingContext {
    pub provider: String,
    pub model: String,
    pub reason: RouteReason,
    pub original_request: ClaudeRequest,
    /// Body after the request chain, once transformed
    pub transformed_request: Option<Value>,
    /// Absent when an explicit override skipped counting
    pub token_count: Option<u64>,
}

impl RoutingContext {
    pub fn route(&self) -> String {
        format!("{},{}", self.provider, self.model)
    }
}

/// Decide the route for a request.
///
/// Priority: valid explicit override, long context, background (haiku),
/// web search, think, default.
pub fn route(
    request: &ClaudeRequest,
    config: &RouterConfig,
    providers: &[ProviderConfig],
    counter: &dyn TokenCounter,
) -> Result<RoutingContext, RoutingError> {
    if let Some((provider, model)) = explicit_override(&request.model, providers) {
        debug!("Explicit route override: {},{}", provider, model);
        return Ok(RoutingContext {
            provider,
            model,
            reason: RouteReason::Override,
            original_request: request.clone(),
            transformed_request: None,
            token_count: None,
        });
    }

    let token_count = counter.count_tokens(
        &request.messages,
        request.system.as_ref(),
        request.tools.as_deref(),
    )?;

    let (reason, route) = select_slot(request, config, token_count);
    let (provider, model) = resolve_route(route, providers)?;

    debug!(
        "Routed via {} to {},{} (tokens={})",
        reason, provider, model, token_count
    );

    Ok(RoutingContext {
        provider,
        model,
        reason,
        original_request: request.clone(),
        transformed_request: None,
        token_count: Some(token_count),
    })
}

/// A `"provider,model"` model field naming a configured pair.
/// Anything else that looks like an override is logged and ignored.
fn explicit_override(model: &str, providers: &[ProviderConfig]) -> Option<(String, String)> {
    if !model.contains(',') {
        return None;
    }

    let valid = parse_route(model).and_then(|(provider, model)| {
        providers
            .iter()
            .find(|p| p.name == provider && p.serves(model))
            .map(|p| (p.name.clone(), model.to_string()))
    });

    if valid.is_none() {
        warn!(
            override_ignored = true,
            requested = %model,
            "Ignoring invalid route override, falling back to routing rules"
        );
    }
    valid
}

fn select_slot<'a>(
    request: &ClaudeRequest,
    config: &'a RouterConfig,
    token_count: u64,
) -> (RouteReason, &'a str) {
    if token_count > config.long_context_threshold {
        if let Some(route) = &config.long_context {
            return (RouteReason::LongContext, route);
        }
    }

    if request.model.to_lowercase().contains("haiku") {
        if let Some(route) = &config.background {
            return (RouteReason::Background, route);
        }
    }

    let wants_web_search = request
        .tools
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|tool| tool.name.starts_with(WEB_SEARCH_TOOL_PREFIX));
    if wants_web_search {
        if let Some(route) = &config.web_search {
            return (RouteReason::WebSearch, route);
        }
    }

    if request.thinking_enabled() {
        if let Some(route) = &config.think {
            return (RouteReason::Think, route);
        }
    }

    (RouteReason::Default, &config.default)
}

/// Resolve a configured route string against the provider list
pub fn resolve_route(
    route: &str,
    providers: &[ProviderConfig],
) -> Result<(String, String), RoutingError> {
    let (provider_name, model) =
        parse_route(route).ok_or_else(|| RoutingError::InvalidRoute(route.to_string()))?;

    let provider = providers
        .iter()
        .find(|p| p.name == provider_name)
        .ok_or_else(|| RoutingError::ProviderNotFound(provider_name.to_string()))?;

    if !provider.serves(model) {
        return Err(RoutingError::ModelNotAvailable {
            provider: provider_name.to_string(),
            model: model.to_string(),
        });
    }

    Ok((provider.name.clone(), model.to_string()))
}

/// Routing engine bound to a configuration snapshot
pub struct RoutingEngine {
    config: RouterConfig,
    providers: Vec<ProviderConfig>,
    counter: Arc<dyn TokenCounter>,
}

impl RoutingEngine {
    pub fn new(
        config: RouterConfig,
        providers: Vec<ProviderConfig>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self { config, providers, counter }
    }

    pub fn route(&self, request: &ClaudeRequest) -> Result<RoutingContext, RoutingError> {
        route(request, &self.config, &self.providers, self.counter.as_ref())
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn token_counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::claude::{
        ClaudeContent, ClaudeMessage, ClaudeTool, SystemPrompt, ThinkingConfig,
    };

    struct FixedCounter(u64);

    impl TokenCounter for FixedCounter {
        fn count_tokens(
            &self,
            _messages: &[ClaudeMessage],
            _system: Option<&SystemPrompt>,
            _tools: Option<&[ClaudeTool]>,
        ) -> Result<u64, TokenCountError> {
            Ok(self.0)
        }
    }

    fn provider(name: &str, models: &[&str]) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            api_base_url: "https://example.com".to_string(),
            api_key: String::new(),
            models: models.iter().map(|m| m.to_string()).collect(),
            transformer: None,
        }
    }

    fn create_test_setup() -> (RouterConfig, Vec<ProviderConfig>) {
        let mut config = RouterConfig::with_default("openai,gpt-4o");
        config.background = Some("openai,gpt-4o-mini".to_string());
        config.think = Some("deepseek,deepseek-reasoner".to_string());
        config.web_search = Some("gemini,g-search".to_string());
        config.long_context = Some("gemini,g-model".to_string());
        let providers = vec![
            provider("openai", &["gpt-4o", "gpt-4o-mini"]),
            provider("deepseek", &["deepseek-reasoner"]),
            provider("gemini", &["g-model", "g-search"]),
        ];
        (config, providers)
    }

    fn request(model: &str) -> ClaudeRequest {
        ClaudeRequest {
            model: model.to_string(),
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: ClaudeContent::Text("hi".to_string()),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_rule_priority() {
        let (config, providers) = create_test_setup();

        let ctx =
            route(&request("claude-3-5-haiku"), &config, &providers, &FixedCounter(90_000)).unwrap();
        assert_eq!(ctx.reason, RouteReason::LongContext);

        let ctx =
            route(&request("claude-3-5-HAIKU"), &config, &providers, &FixedCounter(10)).unwrap();
        assert_eq!(ctx.reason, RouteReason::Background);
        assert_eq!(ctx.route(), "openai,gpt-4o-mini");

        let mut thinking = request("claude-sonnet");
        thinking.thinking = Some(ThinkingConfig::Flag(true));
        thinking.tools = Some(vec![ClaudeTool {
            name: "web_search_20250305".to_string(),
            description: None,
            input_schema: None,
        }]);
        let ctx = route(&thinking, &config, &providers, &FixedCounter(10)).unwrap();
        assert_eq!(ctx.reason, RouteReason::WebSearch);

        thinking.tools = None;
        let ctx = route(&thinking, &config, &providers, &FixedCounter(10)).unwrap();
        assert_eq!(ctx.reason, RouteReason::Think);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let (config, providers) = create_test_setup();
        let ctx =
            route(&request("claude-sonnet"), &config, &providers, &FixedCounter(60_000)).unwrap();
        assert_eq!(ctx.reason, RouteReason::Default);
    }

    #[test]
    fn test_invalid_override_falls_through() {
        let (config, providers) = create_test_setup();

        let ctx =
            route(&request("openai,not-a-model"), &config, &providers, &FixedCounter(5)).unwrap();
        assert_eq!(ctx.reason, RouteReason::Default);
        assert_eq!(ctx.token_count, Some(5));

        let ctx = route(&request("ghost,gpt-4o"), &config, &providers, &FixedCounter(5)).unwrap();
        assert_eq!(ctx.reason, RouteReason::Default);
    }

    #[test]
    fn test_resolve_route_errors() {
        let (_, providers) = create_test_setup();

        assert!(matches!(
            resolve_route("ghost,x", &providers),
            Err(RoutingError::ProviderNotFound(_))
        ));
        assert!(matches!(
            resolve_route("openai,x", &providers),
            Err(RoutingError::ModelNotAvailable { .. })
        ));
        assert!(matches!(resolve_route("openai", &providers), Err(RoutingError::InvalidRoute(_))));
    }
}
