//! Routing tests
//!
//! Slot selection, override handling and route resolution against a parsed
//! config file

use routegate::config::AppConfig;
use routegate::models::claude::{ClaudeMessage, ClaudeRequest, ClaudeTool, SystemPrompt};
use routegate::services::{
    RouteReason, RoutingEngine, RoutingError, TiktokenCounter, TokenCountError, TokenCounter,
};
use serde_json::json;
use std::sync::Arc;

/// Counter returning a fixed token count regardless of input
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

/// Counter that always fails
struct BrokenCounter;

impl TokenCounter for BrokenCounter {
    fn count_tokens(
        &self,
        _messages: &[ClaudeMessage],
        _system: Option<&SystemPrompt>,
        _tools: Option<&[ClaudeTool]>,
    ) -> Result<u64, TokenCountError> {
        Err(TokenCountError::Unavailable("no vocabulary".to_string()))
    }
}

fn create_test_config() -> AppConfig {
    AppConfig::from_json_str(
        r#"{
            "Providers": [
                {"name": "openai", "api_base_url": "https://api.openai.com/v1/chat/completions", "api_key": "sk", "models": ["gpt-4o", "gpt-4o-mini"]},
                {"name": "deepseek", "api_base_url": "https://api.deepseek.com/chat/completions", "api_key": "sk", "models": ["deepseek-chat", "deepseek-reasoner"]},
                {"name": "gemini", "api_base_url": "https://generativelanguage.googleapis.com/v1beta/models", "api_key": "g", "models": ["g-model", "g-search"]}
            ],
            "Router": {
                "default": "openai,gpt-4o",
                "background": "openai,gpt-4o-mini",
                "think": "deepseek,deepseek-reasoner",
                "longContext": "gemini,g-model",
                "webSearch": "gemini,g-search",
                "longContextThreshold": 60000
            }
        }"#,
    )
    .expect("Failed to parse test config")
}

fn create_test_engine(counter: Arc<dyn TokenCounter>) -> RoutingEngine {
    let config = create_test_config();
    RoutingEngine::new(config.router, config.providers, counter)
}

fn create_test_request(model: &str) -> ClaudeRequest {
    serde_json::from_value(json!({
        "model": model,
        "max_tokens": 256,
        "messages": [{"role": "user", "content": "Summarize the release notes"}]
    }))
    .unwrap()
}

#[test]
fn test_default_route() {
    let engine = create_test_engine(Arc::new(FixedCounter(1_200)));

    let ctx = engine.route(&create_test_request("claude-sonnet-4")).unwrap();

    assert_eq!(ctx.reason, RouteReason::Default);
    assert_eq!(ctx.provider, "openai");
    assert_eq!(ctx.model, "gpt-4o");
    assert_eq!(ctx.token_count, Some(1_200));
    assert!(ctx.transformed_request.is_none());
    assert_eq!(ctx.original_request.model, "claude-sonnet-4");
}

#[test]
fn test_explicit_override_skips_counting() {
    // A failing counter proves no count happens on the override path
    let engine = create_test_engine(Arc::new(BrokenCounter));

    let ctx = engine.route(&create_test_request("deepseek,deepseek-chat")).unwrap();

    assert_eq!(ctx.reason, RouteReason::Override);
    assert_eq!(ctx.route(), "deepseek,deepseek-chat");
    assert!(ctx.token_count.is_none());
}

#[test]
fn test_override_wins_over_long_context() {
    let engine = create_test_engine(Arc::new(FixedCounter(500_000)));

    let ctx = engine.route(&create_test_request("openai,gpt-4o-mini")).unwrap();

    assert_eq!(ctx.reason, RouteReason::Override);
    assert_eq!(ctx.route(), "openai,gpt-4o-mini");
}

#[test]
fn test_long_context_route() {
    let engine = create_test_engine(Arc::new(FixedCounter(90_000)));

    let ctx = engine.route(&create_test_request("claude-sonnet-4")).unwrap();

    assert_eq!(ctx.reason, RouteReason::LongContext);
    assert_eq!(ctx.route(), "gemini,g-model");
}

#[test]
fn test_long_context_beats_background() {
    let engine = create_test_engine(Arc::new(FixedCounter(60_001)));

    let ctx = engine.route(&create_test_request("claude-3-5-haiku-20241022")).unwrap();

    assert_eq!(ctx.reason, RouteReason::LongContext);
}

#[test]
fn test_background_route_for_haiku() {
    let engine = create_test_engine(Arc::new(FixedCounter(100)));

    let ctx = engine.route(&create_test_request("claude-3-5-haiku-20241022")).unwrap();

    assert_eq!(ctx.reason, RouteReason::Background);
    assert_eq!(ctx.route(), "openai,gpt-4o-mini");
}

#[test]
fn test_web_search_beats_think() {
    let engine = create_test_engine(Arc::new(FixedCounter(100)));

    let mut request = create_test_request("claude-sonnet-4");
    request.thinking =
        serde_json::from_value(json!({"type": "enabled", "budget_tokens": 2048})).unwrap();
    request.tools = Some(vec![ClaudeTool {
        name: "web_search".to_string(),
        description: Some("Search the web".to_string()),
        input_schema: None,
    }]);

    let ctx = engine.route(&request).unwrap();
    assert_eq!(ctx.reason, RouteReason::WebSearch);
    assert_eq!(ctx.route(), "gemini,g-search");

    request.tools = None;
    let ctx = engine.route(&request).unwrap();
    assert_eq!(ctx.reason, RouteReason::Think);
    assert_eq!(ctx.route(), "deepseek,deepseek-reasoner");
}

#[test]
fn test_disabled_thinking_uses_default() {
    let engine = create_test_engine(Arc::new(FixedCounter(100)));

    let mut request = create_test_request("claude-sonnet-4");
    request.thinking = serde_json::from_value(json!({"type": "disabled"})).unwrap();

    let ctx = engine.route(&request).unwrap();
    assert_eq!(ctx.reason, RouteReason::Default);
}

#[test]
fn test_unset_slots_fall_through_to_default() {
    let config = AppConfig::from_json_str(
        r#"{
            "Providers": [{"name": "openai", "api_base_url": "https://x", "models": ["gpt-4o"]}],
            "Router": {"default": "openai,gpt-4o", "longContext": ""}
        }"#,
    )
    .unwrap();
    let engine =
        RoutingEngine::new(config.router, config.providers, Arc::new(FixedCounter(1_000_000)));

    let mut request = create_test_request("claude-3-haiku");
    request.thinking = serde_json::from_value(json!(true)).unwrap();

    let ctx = engine.route(&request).unwrap();
    assert_eq!(ctx.reason, RouteReason::Default);
    assert_eq!(ctx.route(), "openai,gpt-4o");
}

#[test]
fn test_invalid_override_falls_back() {
    let engine = create_test_engine(Arc::new(FixedCounter(100)));

    for model in ["openai,no-such-model", "nobody,gpt-4o", "openai,", ",gpt-4o"] {
        let ctx = engine.route(&create_test_request(model)).unwrap();
        assert_eq!(ctx.reason, RouteReason::Default, "model field {}", model);
        assert_eq!(ctx.route(), "openai,gpt-4o");
        // The request model is preserved for downstream logging
        assert_eq!(ctx.original_request.model, model);
    }
}

#[test]
fn test_dangling_slot_errors() {
    let config = AppConfig::from_json_str(
        r#"{
            "Providers": [{"name": "openai", "api_base_url": "https://x", "models": ["gpt-4o"]}],
            "Router": {"default": "openai,gpt-4o", "think": "ghost,model", "background": "openai,gpt-5"}
        }"#,
    )
    .unwrap();
    let engine = RoutingEngine::new(config.router, config.providers, Arc::new(FixedCounter(10)));

    let mut thinking = create_test_request("claude-sonnet-4");
    thinking.thinking = serde_json::from_value(json!(true)).unwrap();
    match engine.route(&thinking) {
        Err(RoutingError::ProviderNotFound(name)) => assert_eq!(name, "ghost"),
        other => panic!("expected ProviderNotFound, got {:?}", other.map(|c| c.route())),
    }

    match engine.route(&create_test_request("claude-3-haiku")) {
        Err(RoutingError::ModelNotAvailable { provider, model }) => {
            assert_eq!(provider, "openai");
            assert_eq!(model, "gpt-5");
        }
        other => panic!("expected ModelNotAvailable, got {:?}", other.map(|c| c.route())),
    }
}

#[test]
fn test_counter_failure_surfaces() {
    let engine = create_test_engine(Arc::new(BrokenCounter));

    let result = engine.route(&create_test_request("claude-sonnet-4"));
    assert!(matches!(result, Err(RoutingError::TokenCounting(_))));
}

#[test]
fn test_real_counter_triggers_long_context() {
    let engine = create_test_engine(Arc::new(TiktokenCounter::new()));

    // Well past 60k cl100k tokens
    let long_text = "the quick brown fox jumps over the lazy dog ".repeat(8_000);
    let request: ClaudeRequest = serde_json::from_value(json!({
        "model": "claude-sonnet-4",
        "messages": [{"role": "user", "content": long_text}]
    }))
    .unwrap();

    let ctx = engine.route(&request).unwrap();
    assert_eq!(ctx.reason, RouteReason::LongContext);
    assert!(ctx.token_count.unwrap() > 60_000);
}

#[test]
fn test_engine_lookups() {
    let engine = create_test_engine(Arc::new(FixedCounter(0)));

    assert_eq!(engine.providers().len(), 3);
    assert!(engine.provider("gemini").is_some());
    assert!(engine.provider("anthropic").is_none());
}
