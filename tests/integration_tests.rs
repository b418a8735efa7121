//! Integration tests
//!
//! Drive the full router against an httpmock upstream: buffered, streaming
//! and error pass-through paths, plus the usage bookkeeping behind them

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use httpmock::prelude::*;
use routegate::config::{AppConfig, Settings};
use routegate::handlers::{create_router, create_router_with_state, AppState};
use routegate::services::TiktokenCounter;
use routegate::transformers::TransformerRegistry;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;

/// Create test app config pointing every provider at the mock server
fn create_test_app_config(server: &MockServer) -> AppConfig {
    let config = json!({
        "Providers": [
            {
                "name": "openai",
                "api_base_url": server.url("/v1/chat/completions"),
                "api_key": "sk-test",
                "models": ["gpt-4o", "gpt-4o-mini"],
                "transformer": {"use": ["openai"]}
            },
            {
                "name": "gemini",
                "api_base_url": server.url("/v1beta/models"),
                "api_key": "g-key",
                "models": ["gemini-2.5-pro"],
                "transformer": {"use": ["gemini"]}
            },
            {
                "name": "passthrough",
                "api_base_url": server.url("/anthropic/v1/messages"),
                "api_key": "",
                "models": ["claude-sonnet"]
            }
        ],
        "Router": {
            "default": "openai,gpt-4o",
            "background": "openai,gpt-4o-mini"
        }
    });

    AppConfig::from_json_str(&config.to_string()).expect("Failed to build test config")
}

/// Upstream request carries no `Authorization` header
fn without_authorization(req: &HttpMockRequest) -> bool {
    !req.headers
        .as_ref()
        .map(|headers| headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("authorization")))
        .unwrap_or(false)
}

async fn create_test_app(server: &MockServer) -> Router {
    create_router(Settings::default(), create_test_app_config(server))
        .await
        .expect("Failed to create router")
}

fn messages_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

fn openai_completion(finish_reason: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello there"},
            "finish_reason": finish_reason
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
    })
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let server = MockServer::start_async().await;
    let app = create_test_app(&server).await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "routegate");
    assert_eq!(health["details"]["providers"], 3);
    assert!(health["timestamp"].is_string());
}

#[tokio::test]
async fn test_liveness_check_endpoint() {
    let server = MockServer::start_async().await;
    let app = create_test_app(&server).await;

    let response = app.oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "alive");
    assert!(health["details"]["uptime_seconds"].is_number());
}

#[tokio::test]
async fn test_buffered_openai_round_trip() {
    let server = MockServer::start_async().await;
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test")
                .body_contains("\"model\":\"gpt-4o\"")
                .body_contains("\"role\":\"system\"");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(openai_completion("stop"));
        })
        .await;

    let app = create_test_app(&server).await;
    let response = app
        .clone()
        .oneshot(messages_request(json!({
            "model": "claude-3-5-sonnet",
            "max_tokens": 256,
            "system": "Be brief.",
            "metadata": {"user_id": "user_1_account__session_abc"},
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["content"][0]["text"], "Hello there");
    assert_eq!(body["stop_reason"], "end_turn");
    assert_eq!(body["usage"]["input_tokens"], 12);
    assert_eq!(body["usage"]["output_tokens"], 4);
    upstream.assert_async().await;

    let session = body_json(app.oneshot(get("/api/usage/sessions/abc")).await.unwrap()).await;
    assert_eq!(session["input_tokens"], 12);
    assert_eq!(session["output_tokens"], 4);
    assert_eq!(session["provider"], "openai");
}

#[tokio::test]
async fn test_length_finish_maps_to_max_tokens() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(openai_completion("length"));
        })
        .await;

    let app = create_test_app(&server).await;
    let response = app
        .oneshot(messages_request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "Write a long story"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["stop_reason"], "max_tokens");
}

#[tokio::test]
async fn test_upstream_error_passed_through_verbatim() {
    let server = MockServer::start_async().await;
    let upstream_body = r#"{"error":{"message":"Rate limit reached","type":"rate_limit"}}"#;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(429).header("content-type", "application/json").body(upstream_body);
        })
        .await;

    let app = create_test_app(&server).await;
    let response = app
        .clone()
        .oneshot(messages_request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_text(response).await, upstream_body);

    let usage = body_json(app.oneshot(get("/api/usage")).await.unwrap()).await;
    assert_eq!(usage["sessions"], 0);
}

#[tokio::test]
async fn test_malformed_upstream_body_names_transformer() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({"unexpected": true}));
        })
        .await;

    let app = create_test_app(&server).await;
    let response = app
        .oneshot(messages_request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "transformation_error");
    assert_eq!(body["error"]["details"]["transformer"], "openai");
}

#[tokio::test]
async fn test_streaming_openai_reframed() {
    let server = MockServer::start_async().await;
    let sse = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":2,\"total_tokens\":11}}\n\n",
        "data: [DONE]\n\n"
    );
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("\"stream\":true")
                .body_contains("\"include_usage\":true");
            then.status(200).header("content-type", "text/event-stream").body(sse);
        })
        .await;

    let app = create_test_app(&server).await;
    let response = app
        .clone()
        .oneshot(messages_request(json!({
            "model": "claude-3-5-sonnet",
            "stream": true,
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let text = body_text(response).await;
    upstream.assert_async().await;

    assert!(text.starts_with("event: message_start\n"));
    assert!(text.contains("\"text\":\"Hel\""));
    assert!(text.contains("\"text\":\"lo\""));
    assert!(text.contains("\"stop_reason\":\"end_turn\""));
    assert_eq!(text.matches("event: message_stop").count(), 1);

    let session = body_json(app.oneshot(get("/api/usage/sessions/default")).await.unwrap()).await;
    assert_eq!(session["input_tokens"], 9);
    assert_eq!(session["output_tokens"], 2);
}

#[tokio::test]
async fn test_streaming_gemini_override_with_synthetic_framing() {
    let server = MockServer::start_async().await;
    let sse = concat!(
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Bonjour\"}]}}]}\r\n\r\n",
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"!\"}]},\"finishReason\":\"STOP\"}],",
        "\"usageMetadata\":{\"promptTokenCount\":5,\"candidatesTokenCount\":2}}\r\n\r\n"
    );
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-2.5-pro:streamGenerateContent")
                .query_param("alt", "sse")
                .header("x-goog-api-key", "g-key")
                .matches(without_authorization);
            then.status(200).header("content-type", "text/event-stream").body(sse);
        })
        .await;

    let app = create_test_app(&server).await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .header("x-session-id", "gem")
                .body(Body::from(
                    json!({
                        "model": "gemini,gemini-2.5-pro",
                        "stream": true,
                        "messages": [{"role": "user", "content": "Say hi in French"}]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    upstream.assert_async().await;

    let events: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("event: "))
        .collect();
    assert_eq!(
        events,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );
    assert!(text.contains("\"model\":\"gemini-2.5-pro\""));
}

#[tokio::test]
async fn test_passthrough_provider_forwards_bytes() {
    let server = MockServer::start_async().await;
    let reply = json!({
        "id": "msg_upstream",
        "type": "message",
        "role": "assistant",
        "model": "claude-sonnet",
        "content": [{"type": "text", "text": "from upstream"}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 7, "output_tokens": 3}
    });
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/anthropic/v1/messages")
                .matches(without_authorization)
                .body_contains("\"model\":\"claude-sonnet\"");
            then.status(200).json_body(reply.clone());
        })
        .await;

    let app = create_test_app(&server).await;
    let response = app
        .clone()
        .oneshot(messages_request(json!({
            "model": "passthrough,claude-sonnet",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, reply);
    upstream.assert_async().await;

    let usage = body_json(app.oneshot(get("/api/usage")).await.unwrap()).await;
    assert_eq!(usage["by_provider"]["passthrough"]["input_tokens"], 7);
}

#[tokio::test]
async fn test_passthrough_forwards_client_body_unchanged() {
    let server = MockServer::start_async().await;
    let client_body = json!({
        "model": "passthrough,claude-sonnet",
        "max_tokens": 64,
        "messages": [
            {"role": "user", "content": [
                {"type": "text", "text": "hi", "cache_control": {"type": "ephemeral"}}
            ]},
            {"role": "assistant", "content": [
                {"type": "thinking", "thinking": "the user greets me", "signature": "sig-1"},
                {"type": "text", "text": "ok"}
            ]},
            {"role": "user", "content": "go on"}
        ]
    });
    let mut forwarded = client_body.clone();
    forwarded["model"] = json!("claude-sonnet");

    let upstream = server
        .mock_async(|when, then| {
            when.method(POST).path("/anthropic/v1/messages").json_body(forwarded.clone());
            then.status(200).json_body(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "continuing"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 30, "output_tokens": 2}
            }));
        })
        .await;

    let app = create_test_app(&server).await;
    let response = app.oneshot(messages_request(client_body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    upstream.assert_async().await;
}

/// Read one request (headers plus `content-length` body) off the socket
async fn read_http_request(socket: &mut TcpStream) {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        received.extend_from_slice(&buf[..n]);

        if let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&received[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if received.len() >= end + 4 + length {
                return;
            }
        }
    }
}

/// Write SSE response headers promising more body than `first` carries
async fn write_partial_sse(socket: &mut TcpStream, first: &str) {
    let head = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\n\r\n",
        first.len() + 4096
    );
    socket.write_all(head.as_bytes()).await.unwrap();
    socket.write_all(first.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();
}

fn create_raw_upstream_config(addr: SocketAddr) -> AppConfig {
    let config = json!({
        "Providers": [{
            "name": "openai",
            "api_base_url": format!("http://{}/v1/chat/completions", addr),
            "api_key": "sk-test",
            "models": ["gpt-4o"],
            "transformer": {"use": ["openai"]}
        }],
        "Router": {"default": "openai,gpt-4o"}
    });
    AppConfig::from_json_str(&config.to_string()).expect("Failed to build test config")
}

const FIRST_OPENAI_CHUNK: &str =
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n";

#[tokio::test]
async fn test_stream_reader_error_ends_with_one_error_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_http_request(&mut socket).await;
        write_partial_sse(&mut socket, FIRST_OPENAI_CHUNK).await;
        // Dropping the socket cuts the body short
    });

    let app = create_router(Settings::default(), create_raw_upstream_config(addr))
        .await
        .unwrap();
    let response = app
        .oneshot(messages_request(json!({
            "model": "claude-3-5-sonnet",
            "stream": true,
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    assert!(text.starts_with("event: message_start\n"));
    assert!(text.contains("\"text\":\"Hel\""));
    assert_eq!(text.matches("event: error").count(), 1);
    assert!(!text.contains("event: message_stop"));

    let last = text.trim_end().rsplit("\n\n").next().unwrap();
    assert!(last.starts_with("event: error\n"));
    assert!(last.contains("\"type\":\"api_error\""));
}

#[tokio::test]
async fn test_client_disconnect_drops_upstream_and_records_usage() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_http_request(&mut socket).await;
        write_partial_sse(&mut socket, FIRST_OPENAI_CHUNK).await;

        // Blocks until the gateway lets go of the connection
        let mut buf = [0u8; 64];
        let closed = matches!(socket.read(&mut buf).await, Ok(0) | Err(_));
        let _ = closed_tx.send(closed);
    });

    let state = AppState::new(
        Settings::default(),
        create_raw_upstream_config(addr),
        Arc::new(TransformerRegistry::with_builtins()),
        Arc::new(TiktokenCounter::new()),
    )
    .expect("Failed to build state");
    let usage = state.usage.clone();
    let app = create_router_with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .header("x-session-id", "gone")
                .body(Body::from(
                    json!({
                        "model": "claude-3-5-sonnet",
                        "stream": true,
                        "messages": [{"role": "user", "content": "Hi"}]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("event: message_start"));
    drop(body);

    let closed = tokio::time::timeout(Duration::from_secs(5), closed_rx)
        .await
        .expect("upstream connection stayed open after the client left")
        .unwrap();
    assert!(closed);

    let mut record = None;
    for _ in 0..100 {
        record = usage.get("gone");
        if record.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let record = record.expect("usage was not recorded after disconnect");
    assert_eq!(record.request_count, 1);
    assert_eq!(record.provider, "openai");
}

#[tokio::test]
async fn test_invalid_override_falls_back_to_default() {
    let server = MockServer::start_async().await;
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("\"model\":\"gpt-4o\"");
            then.status(200).json_body(openai_completion("stop"));
        })
        .await;

    let app = create_test_app(&server).await;
    let response = app
        .oneshot(messages_request(json!({
            "model": "nosuch,model-x",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    upstream.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_upstream_is_proxy_error() {
    let config = AppConfig::from_json_str(
        r#"{
            "Providers": [{"name": "down", "api_base_url": "http://127.0.0.1:9/v1/chat/completions", "api_key": "k", "models": ["m"], "transformer": ["openai"]}],
            "Router": {"default": "down,m"}
        }"#,
    )
    .unwrap();
    let app = create_router(Settings::default(), config).await.unwrap();

    let response = app
        .oneshot(messages_request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"]["type"], "proxy_error");
}

#[tokio::test]
async fn test_dangling_default_route_is_not_found() {
    let config = AppConfig::from_json_str(
        r#"{
            "Providers": [{"name": "p", "api_base_url": "https://example.com/v1", "api_key": "k", "models": ["m"]}],
            "Router": {"default": "p,missing-model"}
        }"#,
    )
    .unwrap();
    let app = create_router(Settings::default(), config).await.unwrap();

    let response = app
        .oneshot(messages_request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "routing_error");
    assert_eq!(body["error"]["details"]["model"], "missing-model");
}

#[tokio::test]
async fn test_count_tokens_endpoint() {
    let server = MockServer::start_async().await;
    let app = create_test_app(&server).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages/count_tokens")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "model": "claude-3-5-sonnet",
                        "system": "You are terse.",
                        "messages": [{"role": "user", "content": "How many tokens is this sentence?"}]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["input_tokens"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_messages_validation_errors() {
    let server = MockServer::start_async().await;
    let app = create_test_app(&server).await;

    let response = app
        .clone()
        .oneshot(messages_request(json!({"model": "claude-3-5-sonnet", "messages": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["type"], "invalid_request_error");

    let response = app
        .clone()
        .oneshot(messages_request(json!({
            "model": "claude-3-5-sonnet",
            "temperature": 3.0,
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_unsupported_method() {
    let server = MockServer::start_async().await;
    let app = create_test_app(&server).await;

    let request = Request::builder()
        .method("PUT")
        .uri("/v1/messages")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_not_found_endpoint() {
    let server = MockServer::start_async().await;
    let app = create_test_app(&server).await;

    let response = app.oneshot(get("/nonexistent")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
