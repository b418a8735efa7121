//! SSE plumbing for the streaming path
//!
//! Splits upstream bytes into lines, re-frames transformer output into one
//! well-formed message and watches emitted frames for usage bookkeeping.

use crate::models::claude::{ClaudeContentBlock, ClaudeMessageDelta, ClaudeStreamEvent, ClaudeUsage};
use crate::transformers::{message_start_event, sse_frame};
use serde_json::Value;
use tracing::debug;

/// Accumulates upstream bytes and yields complete lines.
/// Bytes are kept until a newline arrives so multi-byte characters split
/// across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line (without `\r\n` / `\n`)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Trailing data without a final newline
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

/// Tracks what the client has been sent so far
#[derive(Debug, Default, Clone)]
pub struct StreamObserver {
    pub frames_sent: usize,
    pub saw_message_start: bool,
    pub saw_message_stop: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl StreamObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a block of SSE text (one or more frames)
    pub fn observe(&mut self, text: &str) {
        for line in text.lines() {
            if let Some(data) = line.strip_prefix("data:") {
                self.observe_data(data.trim());
            }
        }
    }

    fn observe_data(&mut self, data: &str) {
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(_) => return,
        };

        self.frames_sent += 1;
        match value.get("type").and_then(|t| t.as_str()) {
            Some("message_start") => {
                self.saw_message_start = true;
                self.record_usage(value.get("message").and_then(|m| m.get("usage")));
            }
            Some("message_delta") => self.record_usage(value.get("usage")),
            Some("message_stop") => self.saw_message_stop = true,
            _ => {}
        }
    }

    /// Non-zero counts overwrite; providers report cumulative totals
    fn record_usage(&mut self, usage: Option<&Value>) {
        let Some(usage) = usage else { return };
        let read = |key: &str| usage.get(key).and_then(|v| v.as_u64()).filter(|n| *n > 0);

        if let Some(input) = read("input_tokens") {
            self.input_tokens = input;
        }
        if let Some(output) = read("output_tokens") {
            self.output_tokens = output;
        }
    }

    /// Whether the given output opens with a `message_start` frame
    pub fn starts_with_message_start(text: &str) -> bool {
        text.trim_start().starts_with("event: message_start")
    }
}

/// Stream-wide framing state for transformed streams.
///
/// Transformers convert one upstream line at a time and cannot see the rest
/// of the stream, so the block indexes they report are only meaningful while
/// that block is open. The framer keeps the client view consistent:
///
/// - exactly one `message_start`, synthesized if the transformer sends none
/// - blocks are numbered 0, 1, 2, .. in the order they open, one open at a time
/// - a text delta with no open block opens a text block
/// - every open block is closed before the final `message_delta`
/// - stop reason and usage arrive together in that single `message_delta`,
///   followed by one `message_stop`
///
/// Frames are handled as JSON so block and delta types this gateway does not
/// model keep all of their fields.
#[derive(Debug)]
pub struct StreamFramer {
    model: String,
    input_estimate: u64,
    started: bool,
    stopped: bool,
    next_index: u64,
    /// (index reported by the transformer, index sent to the client)
    open: Option<(u64, u64)>,
    saw_tool_use: bool,
    stop_reason: Option<String>,
    stop_sequence: Option<String>,
    usage: ClaudeUsage,
}

impl StreamFramer {
    pub fn new(model: impl Into<String>, input_estimate: u64) -> Self {
        Self {
            model: model.into(),
            input_estimate,
            started: false,
            stopped: false,
            next_index: 0,
            open: None,
            saw_tool_use: false,
            stop_reason: None,
            stop_sequence: None,
            usage: ClaudeUsage::default(),
        }
    }

    /// Whether `message_stop` has been sent
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Re-frame the output of one transformed line (zero or more SSE frames)
    pub fn push(&mut self, output: &str) -> String {
        let mut framed = String::new();

        for frame in output.split("\n\n").filter(|f| !f.trim().is_empty()) {
            let event = frame
                .lines()
                .find_map(|line| line.strip_prefix("data:"))
                .and_then(|data| serde_json::from_str::<Value>(data.trim()).ok())
                .filter(|event| event.get("type").and_then(Value::as_str).is_some());

            match event {
                Some(event) => self.handle(event, &mut framed),
                None if self.stopped => {}
                None => {
                    framed.push_str(frame.trim_start_matches('\n'));
                    framed.push_str("\n\n");
                }
            }
        }

        framed
    }

    /// Upstream EOF: close whatever is open and end the message
    pub fn finish(&mut self) -> String {
        let mut framed = String::new();
        self.end(&mut framed);
        framed
    }

    fn handle(&mut self, mut event: Value, out: &mut String) {
        let event_type = event["type"].as_str().unwrap_or_default().to_string();
        if self.stopped {
            debug!("Dropping {} frame after message_stop", event_type);
            return;
        }

        let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);

        match event_type.as_str() {
            "message_start" => {
                if self.started {
                    return;
                }
                self.started = true;
                if let Some(input) = event.pointer_mut("/message/usage/input_tokens") {
                    if input.as_u64().unwrap_or(0) == 0 {
                        *input = Value::from(self.input_estimate);
                    }
                }
                push_event(out, &event);
            }
            "content_block_start" => {
                self.ensure_started(out);
                if event["content_block"]["type"] == "tool_use" {
                    self.saw_tool_use = true;
                }
                let client = self.open_block(index, out);
                event["index"] = Value::from(client);
                push_event(out, &event);
            }
            "content_block_delta" => {
                self.ensure_started(out);
                let open = self.open;
                let client = match open {
                    Some((reported, client)) if reported == index => client,
                    _ if event["delta"]["type"] == "text_delta" => {
                        let client = self.open_block(index, out);
                        out.push_str(&sse_frame(&ClaudeStreamEvent::ContentBlockStart {
                            index: client as u32,
                            content_block: ClaudeContentBlock::Text { text: String::new() },
                        }));
                        client
                    }
                    _ => {
                        debug!(
                            "Dropping {} for block {} that is not open",
                            event["delta"]["type"], index
                        );
                        return;
                    }
                };
                event["index"] = Value::from(client);
                push_event(out, &event);
            }
            "content_block_stop" => {
                if matches!(self.open, Some((reported, _)) if reported == index) {
                    self.close_open(out);
                }
            }
            "message_delta" => {
                self.ensure_started(out);
                let delta = &event["delta"];
                if let Some(reason) = delta.get("stop_reason").and_then(Value::as_str) {
                    self.stop_reason = Some(reason.to_string());
                }
                if let Some(sequence) = delta.get("stop_sequence").and_then(Value::as_str) {
                    self.stop_sequence = Some(sequence.to_string());
                }
                let read = |key: &str| event["usage"][key].as_u64().filter(|n| *n > 0);
                if let Some(input) = read("input_tokens") {
                    self.usage.input_tokens = input;
                }
                if let Some(output) = read("output_tokens") {
                    self.usage.output_tokens = output;
                }
            }
            "message_stop" => self.end(out),
            _ => push_event(out, &event),
        }
    }

    fn ensure_started(&mut self, out: &mut String) {
        if !self.started {
            self.started = true;
            out.push_str(&sse_frame(&message_start_event(&self.model, self.input_estimate)));
        }
    }

    /// Close the open block and allocate the next client index
    fn open_block(&mut self, reported: u64, out: &mut String) -> u64 {
        self.close_open(out);
        let client = self.next_index;
        self.next_index += 1;
        self.open = Some((reported, client));
        client
    }

    fn close_open(&mut self, out: &mut String) {
        if let Some((_, index)) = self.open.take() {
            out.push_str(&sse_frame(&ClaudeStreamEvent::ContentBlockStop { index: index as u32 }));
        }
    }

    fn end(&mut self, out: &mut String) {
        if self.stopped {
            return;
        }
        self.ensure_started(out);
        self.close_open(out);

        // Gemini reports STOP even when the turn ended in function calls
        let stop_reason = match self.stop_reason.take() {
            Some(reason) if reason == "end_turn" && self.saw_tool_use => {
                Some("tool_use".to_string())
            }
            other => other,
        };

        out.push_str(&sse_frame(&ClaudeStreamEvent::MessageDelta {
            delta: ClaudeMessageDelta {
                stop_reason,
                stop_sequence: self.stop_sequence.take(),
            },
            usage: self.usage.clone(),
        }));
        out.push_str(&sse_frame(&ClaudeStreamEvent::MessageStop));
        self.stopped = true;
    }
}

/// Render a JSON event as an SSE frame named after its `type`
fn push_event(out: &mut String, event: &Value) {
    let name = event["type"].as_str().unwrap_or("message");
    out.push_str(&format!("event: {}\ndata: {}\n\n", name, event));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_split_chunks() {
        let mut buffer = SseLineBuffer::new();

        assert!(buffer.push(b"data: {\"a\"").is_empty());
        let lines = buffer.push(b":1}\r\n\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), String::new()]);

        assert!(buffer.push(b"NE]").is_empty());
        assert_eq!(buffer.finish(), Some("data: [DONE]".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_multibyte_boundary() {
        let mut buffer = SseLineBuffer::new();
        let bytes = "data: héllo\n".as_bytes();

        assert!(buffer.push(&bytes[..8]).is_empty());
        assert_eq!(buffer.push(&bytes[8..]), vec!["data: héllo".to_string()]);
    }

    #[test]
    fn test_observer_tracks_usage_and_markers() {
        let mut observer = StreamObserver::new();

        observer.observe("event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":12,\"output_tokens\":0}}}\n\n");
        observer.observe("event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"input_tokens\":0,\"output_tokens\":0}}\n\n");
        observer.observe("event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{},\"usage\":{\"input_tokens\":12,\"output_tokens\":7}}\n\n");
        observer.observe("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");

        assert!(observer.saw_message_start);
        assert!(observer.saw_message_stop);
        assert_eq!((observer.input_tokens, observer.output_tokens), (12, 7));
        assert_eq!(observer.frames_sent, 4);
    }

    fn events(output: &str) -> Vec<Value> {
        output
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    fn types(events: &[Value]) -> Vec<&str> {
        events.iter().map(|e| e["type"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_framer_closes_blocks_and_merges_message_delta() {
        let mut framer = StreamFramer::new("gpt-4o", 0);
        let mut output = String::new();

        output.push_str(&framer.push("event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"content\":[],\"model\":\"gpt-4o\",\"stop_reason\":null,\"stop_sequence\":null,\"usage\":{\"input_tokens\":0,\"output_tokens\":0}}}\n\nevent: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n"));
        output.push_str(&framer.push("event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"call_1\",\"name\":\"ls\",\"input\":{}}}\n\n"));
        output.push_str(&framer.push("event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{}\"}}\n\n"));
        output.push_str(&framer.push("event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\nevent: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"input_tokens\":0,\"output_tokens\":0}}\n\n"));
        output.push_str(&framer.push("event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{},\"usage\":{\"input_tokens\":31,\"output_tokens\":17}}\n\n"));
        output.push_str(&framer.push("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"));

        let events = events(&output);
        assert_eq!(
            types(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(events[2]["index"], 0);
        assert_eq!(events[3]["index"], 1);
        assert_eq!(events[5]["index"], 1);
        assert_eq!(events[6]["delta"]["stop_reason"], "tool_use");
        assert_eq!(events[6]["usage"]["input_tokens"], 31);
        assert_eq!(events[6]["usage"]["output_tokens"], 17);
        assert!(framer.is_stopped());
        assert_eq!(framer.finish(), "");
    }

    #[test]
    fn test_framer_renumbers_reused_indexes() {
        let mut framer = StreamFramer::new("gemini-2.5-pro", 40);
        let tool = |name: &str| {
            format!(
                "event: content_block_start\ndata: {{\"type\":\"content_block_start\",\"index\":1,\"content_block\":{{\"type\":\"tool_use\",\"id\":\"t\",\"name\":\"{}\",\"input\":{{}}}}}}\n\nevent: content_block_stop\ndata: {{\"type\":\"content_block_stop\",\"index\":1}}\n\n",
                name
            )
        };

        let mut output = framer.push(&tool("first"));
        output.push_str(&framer.push(&tool("second")));
        output.push_str(&framer.push("event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"done\"}}\n\n"));
        output.push_str(&framer.push("event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"input_tokens\":0,\"output_tokens\":4}}\n\n"));
        output.push_str(&framer.finish());

        let events = events(&output);
        assert_eq!(events[0]["type"], "message_start");
        assert_eq!(events[0]["message"]["usage"]["input_tokens"], 40);

        let starts: Vec<(u64, &str)> = events
            .iter()
            .filter(|e| e["type"] == "content_block_start")
            .map(|e| (e["index"].as_u64().unwrap(), e["content_block"]["type"].as_str().unwrap()))
            .collect();
        assert_eq!(starts, vec![(0, "tool_use"), (1, "tool_use"), (2, "text")]);

        let stops: Vec<u64> = events
            .iter()
            .filter(|e| e["type"] == "content_block_stop")
            .map(|e| e["index"].as_u64().unwrap())
            .collect();
        assert_eq!(stops, vec![0, 1, 2]);

        let last = &events[events.len() - 2];
        assert_eq!(last["delta"]["stop_reason"], "tool_use");
        assert_eq!(last["usage"]["output_tokens"], 4);
        assert_eq!(types(&events).iter().filter(|t| **t == "message_stop").count(), 1);
    }

    #[test]
    fn test_framer_passes_errors_and_unknown_frames() {
        let mut framer = StreamFramer::new("m", 0);

        let error = framer.push("event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded\",\"message\":\"busy\"}}\n\n");
        assert!(error.starts_with("event: error\n"));

        let custom = framer.push("event: custom\ndata: {\"type\":\"custom\"}\n\n");
        assert_eq!(custom, "event: custom\ndata: {\"type\":\"custom\"}\n\n");

        let closing = framer.finish();
        assert_eq!(
            types(&events(&closing)),
            vec!["message_start", "message_delta", "message_stop"]
        );
        assert_eq!(framer.push(&custom), "");
    }
}
