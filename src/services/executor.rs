//! Request executor
//!
//! Runs one client request through the gateway pipeline:
//! routing, request chain, upstream call, then either the streaming path
//! (per-line chunk transform, immediate flush) or the buffered path
//! (response chain in reverse order). Usage is recorded on every exit.

use crate::config::settings::UpstreamConfig;
use crate::config::ProviderConfig;
use crate::models::claude::{ClaudeError, ClaudeRequest, ClaudeStreamEvent};
use crate::services::router::{RoutingContext, RoutingEngine};
use crate::services::sse::{SseLineBuffer, StreamFramer, StreamObserver};
use crate::services::usage::UsageTracker;
use crate::transformers::{sse_frame, ResolvedTransformer, TransformerRegistry};
use crate::utils::error::{GatewayError, GatewayResult};
use crate::utils::logging::create_upstream_request_log_summary;
use anyhow::Context;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Pipeline stages, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Routing,
    TransformingRequest,
    CallingUpstream,
    Streaming,
    TransformingResponse,
    Done,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStage::Routing => "ROUTING",
            ExecutionStage::TransformingRequest => "TRANSFORMING_REQUEST",
            ExecutionStage::CallingUpstream => "CALLING_UPSTREAM",
            ExecutionStage::Streaming => "STREAMING",
            ExecutionStage::TransformingResponse => "TRANSFORMING_RESPONSE",
            ExecutionStage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Everything a single execution needs after routing
struct Execution {
    routing: RoutingContext,
    provider: ProviderConfig,
    chain: Vec<ResolvedTransformer>,
    session_id: String,
    streaming: bool,
}

impl Execution {
    fn stage(&self, stage: ExecutionStage) {
        debug!(
            stage = %stage,
            route = %self.routing.route(),
            session = %self.session_id,
            "Execution stage"
        );
    }

    fn has_stream_transform(&self) -> bool {
        self.chain.iter().any(|t| t.transformer.capabilities().stream)
    }

    fn has_response_transform(&self) -> bool {
        self.chain.iter().any(|t| t.transformer.capabilities().response)
    }
}

/// Upstream-facing request executor
pub struct Executor {
    client: reqwest::Client,
    registry: Arc<TransformerRegistry>,
    usage: Arc<UsageTracker>,
    timeouts: UpstreamConfig,
}

impl Executor {
    pub fn new(
        registry: Arc<TransformerRegistry>,
        usage: Arc<UsageTracker>,
        timeouts: UpstreamConfig,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_timeout))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create upstream HTTP client")?;

        Ok(Self {
            client,
            registry,
            usage,
            timeouts,
        })
    }

    /// Execute a client request end to end.
    ///
    /// `request` drives routing; `body` is the client's JSON as received and is
    /// what the request chain starts from, so an empty chain forwards it as is.
    pub async fn execute(
        &self,
        router: &RoutingEngine,
        request: &ClaudeRequest,
        body: Value,
        session_id: String,
    ) -> GatewayResult<Response> {
        let streaming = request.is_streaming();

        debug!(stage = %ExecutionStage::Routing, model = %request.model, "Execution stage");
        let routing = router.route(request)?;
        let provider = router.provider(&routing.provider).cloned().ok_or_else(|| {
            GatewayError::Proxy(format!(
                "provider '{}' vanished from configuration",
                routing.provider
            ))
        })?;
        let chain = self.registry.get_transformers(&provider, &routing.model);

        info!(
            "Routing {} -> {},{} via {} (tokens={:?}, chain=[{}])",
            request.model,
            routing.provider,
            routing.model,
            routing.reason,
            routing.token_count,
            chain.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
        );

        let mut execution = Execution {
            routing,
            provider,
            chain,
            session_id,
            streaming,
        };

        execution.stage(ExecutionStage::TransformingRequest);
        let body = self.transform_request(&execution, body).await?;
        debug!(
            "Upstream request: {}",
            create_upstream_request_log_summary(&body)
        );
        execution.routing.transformed_request = Some(body);

        execution.stage(ExecutionStage::CallingUpstream);
        let upstream = self.call_upstream(&execution).await?;

        let status = upstream.status();
        if !status.is_success() {
            return Ok(self.passthrough_error(&execution, upstream).await);
        }

        if execution.streaming {
            execution.stage(ExecutionStage::Streaming);
            Ok(self.stream_response(execution, upstream))
        } else {
            execution.stage(ExecutionStage::TransformingResponse);
            self.buffered_response(execution, upstream).await
        }
    }

    /// Run the request chain in registration order; only `model` is rewritten
    /// before the first transformer sees the body
    async fn transform_request(
        &self,
        execution: &Execution,
        mut body: Value,
    ) -> GatewayResult<Value> {
        match body.as_object_mut() {
            Some(object) => {
                object.insert("model".to_string(), Value::String(execution.routing.model.clone()));
            }
            None => {
                return Err(GatewayError::Validation(
                    "request body must be a JSON object".to_string(),
                ))
            }
        }

        for entry in &execution.chain {
            let context = entry.context(&execution.routing.provider, &execution.routing.model);
            body = entry
                .transformer
                .transform_request(body, &context)
                .await
                .map_err(|e| GatewayError::transformation(entry.name(), e))?;
        }

        Ok(body)
    }

    async fn call_upstream(&self, execution: &Execution) -> GatewayResult<reqwest::Response> {
        let routing = &execution.routing;
        let provider = &execution.provider;

        let url = execution
            .chain
            .iter()
            .find_map(|entry| {
                let context = entry.context(&routing.provider, &routing.model);
                entry
                    .transformer
                    .endpoint(&provider.api_base_url, &context, execution.streaming)
            })
            .unwrap_or_else(|| provider.api_base_url.clone());

        let auth = execution
            .chain
            .iter()
            .find_map(|entry| entry.transformer.upstream_auth(&provider.api_key));

        let timeout = if execution.streaming {
            self.timeouts.stream_timeout
        } else {
            self.timeouts.request_timeout
        };

        let mut builder = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(timeout))
            .header("Content-Type", "application/json");

        builder = match auth {
            Some(headers) => headers
                .into_iter()
                .fold(builder, |b, (name, value)| b.header(name, value)),
            None if !provider.api_key.is_empty() => builder.bearer_auth(&provider.api_key),
            None => builder,
        };

        if let Some(body) = &routing.transformed_request {
            builder = builder.json(body);
        }

        debug!("Calling upstream {} (stream={})", url, execution.streaming);
        builder.send().await.map_err(|e| {
            error!("Upstream request to {} failed: {}", url, e);
            GatewayError::Proxy(e.to_string())
        })
    }

    /// Forward a non-2xx upstream response verbatim
    async fn passthrough_error(
        &self,
        execution: &Execution,
        upstream: reqwest::Response,
    ) -> Response {
        let status =
            StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = upstream
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let body = upstream.bytes().await.unwrap_or_default();

        warn!(
            "Upstream {} returned {}: {}",
            execution.routing.route(),
            status,
            String::from_utf8_lossy(&body[..body.len().min(512)])
        );

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }

    async fn buffered_response(
        &self,
        execution: Execution,
        upstream: reqwest::Response,
    ) -> GatewayResult<Response> {
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| GatewayError::Proxy(format!("failed to read upstream body: {}", e)))?;

        if !execution.has_response_transform() {
            if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                self.record_usage(&execution, extract_usage(&value));
            }
            execution.stage(ExecutionStage::Done);
            let mut response = Response::new(Body::from(bytes));
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            return Ok(response);
        }

        let mut value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            let name = execution
                .chain
                .iter()
                .rev()
                .find(|t| t.transformer.capabilities().response)
                .map(|t| t.name().to_string())
                .unwrap_or_default();
            GatewayError::transformation(name, format!("upstream body is not JSON: {}", e))
        })?;

        for entry in execution.chain.iter().rev() {
            let context = entry.context(&execution.routing.provider, &execution.routing.model);
            value = entry
                .transformer
                .transform_response(value, &context)
                .map_err(|e| GatewayError::transformation(entry.name(), e))?;
        }

        self.record_usage(&execution, extract_usage(&value));
        execution.stage(ExecutionStage::Done);
        Ok(Json(value).into_response())
    }

    fn stream_response(&self, execution: Execution, upstream: reqwest::Response) -> Response {
        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(100);
        let usage = self.usage.clone();

        tokio::spawn(async move {
            let client = tx.clone();
            let mut pump = StreamPump::new(&execution, tx);
            let mut upstream = upstream.bytes_stream();

            loop {
                tokio::select! {
                    _ = client.closed() => {
                        debug!("Client disconnected, dropping upstream stream");
                        break;
                    }
                    next = upstream.next() => match next {
                        Some(Ok(chunk)) => {
                            if !pump.forward(&execution, &chunk).await {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!("Upstream stream error: {}", e);
                            pump.fail(&e.to_string()).await;
                            break;
                        }
                        None => {
                            pump.finish(&execution).await;
                            break;
                        }
                    }
                }
            }

            let observer = pump.observer;
            usage.track_usage(
                &execution.session_id,
                &execution.routing.provider,
                observer.input_tokens,
                observer.output_tokens,
            );
            execution.stage(ExecutionStage::Done);
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from_stream(ReceiverStream::new(rx)))
            .unwrap_or_else(|e| {
                error!("Failed to build streaming response: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
    }

    fn record_usage(&self, execution: &Execution, (input, output): (u64, u64)) {
        self.usage
            .track_usage(&execution.session_id, &execution.routing.provider, input, output);
    }
}

/// Per-stream state inside the spawned task
struct StreamPump {
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
    lines: SseLineBuffer,
    observer: StreamObserver,
    /// None when the stream passes through untouched
    framer: Option<StreamFramer>,
}

impl StreamPump {
    fn new(execution: &Execution, tx: mpsc::Sender<Result<Bytes, std::io::Error>>) -> Self {
        let framer = execution.has_stream_transform().then(|| {
            StreamFramer::new(&execution.routing.model, execution.routing.token_count.unwrap_or(0))
        });

        Self {
            tx,
            lines: SseLineBuffer::new(),
            observer: StreamObserver::new(),
            framer,
        }
    }

    /// Handle one upstream chunk; false once the client is gone
    async fn forward(&mut self, execution: &Execution, chunk: &[u8]) -> bool {
        if self.framer.is_none() {
            // Pass-through: bytes go out untouched, lines are only observed
            for line in self.lines.push(chunk) {
                self.observer.observe(&line);
            }
            return self.tx.send(Ok(Bytes::copy_from_slice(chunk))).await.is_ok();
        }

        for line in self.lines.push(chunk) {
            let framed = self.frame(execution, &line);
            if !framed.is_empty() && !self.emit(framed).await {
                return false;
            }
        }
        true
    }

    /// Upstream EOF: flush the tail and end the message
    async fn finish(&mut self, execution: &Execution) {
        if let Some(line) = self.lines.finish() {
            if self.framer.is_some() {
                let framed = self.frame(execution, &line);
                if !framed.is_empty() && !self.emit(framed).await {
                    return;
                }
            } else {
                self.observer.observe(&line);
            }
        }

        let closing = self.framer.as_mut().map(StreamFramer::finish).unwrap_or_default();
        if !closing.is_empty() {
            self.emit(closing).await;
        }
    }

    /// Run one upstream line through the chain and the framer
    fn frame(&mut self, execution: &Execution, line: &str) -> String {
        let output = run_stream_chain(execution, line);
        match self.framer.as_mut() {
            Some(framer) if !output.is_empty() => framer.push(&output),
            Some(_) => String::new(),
            None => output,
        }
    }

    /// Mid-stream reader failure: one error frame, then the stream ends
    async fn fail(&mut self, message: &str) {
        let frame = sse_frame(&ClaudeStreamEvent::Error {
            error: ClaudeError {
                error_type: "api_error".to_string(),
                message: format!("Upstream stream error: {}", message),
            },
        });
        let _ = self.tx.send(Ok(Bytes::from(frame))).await;
    }

    async fn emit(&mut self, output: String) -> bool {
        self.observer.observe(&output);
        self.tx.send(Ok(Bytes::from(output))).await.is_ok()
    }
}

/// Feed one upstream line through the chain in reverse order
fn run_stream_chain(execution: &Execution, line: &str) -> String {
    let mut output = line.to_string();
    for entry in execution.chain.iter().rev() {
        if output.is_empty() {
            break;
        }
        let context = entry.context(&execution.routing.provider, &execution.routing.model);
        output = entry.transformer.transform_stream_chunk(&output, &context);
    }
    output
}

/// `usage.input_tokens` / `usage.output_tokens` of a client-shaped response
pub fn extract_usage(response: &Value) -> (u64, u64) {
    let usage = response.get("usage");
    let read = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    };
    (read("input_tokens"), read("output_tokens"))
}
