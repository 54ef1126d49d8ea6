//! Ollama chat backend.
//!
//! Streams `POST /api/chat` as newline-delimited JSON. Each request yields a
//! single response whose fragments are the `message.content` deltas, with
//! reasoning blocks removed. Native tool calls, when enabled, are rendered
//! back into `tool_code` text so they reach the same dispatch path as tool
//! calls the model writes itself.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::think::ThinkFilter;
use super::{FragmentStream, LanguageModel, ModelRequest, ResponseStream};
use crate::config::LlmConfig;
use crate::error::{ElysiaError, Result};
use crate::tools::literal::to_literal;
use crate::tools::tool_code::{FENCE, TOOL_FENCE_OPEN};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streaming client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OllamaModel {
    /// # Errors
    ///
    /// Returns [`ElysiaError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ElysiaError::Llm(format!("failed to build HTTP client: {e}")))?;
        info!("Ollama backend: {} model={}", config.api_url, config.model);
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.api_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &ModelRequest) -> Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
            "stream": true,
            "options": {"temperature": self.config.temperature},
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
        }
        body
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn respond(&self, request: &ModelRequest) -> Result<ResponseStream> {
        let url = self.chat_url();
        let body = self.build_body(request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ElysiaError::Llm(format!("Ollama request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ElysiaError::Llm(format!(
                "Ollama HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&text)
            )));
        }

        let fragments: FragmentStream = Box::pin(fragment_stream(response.bytes_stream()));
        Ok(Box::pin(stream::iter(vec![fragments])))
    }
}

/// Pull the `error` field out of an Ollama error body.
fn extract_error_message(body: &str) -> String {
    if body.trim().is_empty() {
        return "no response body".to_owned();
    }
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.trim().to_owned())
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ToolCallWire>,
}

#[derive(Debug, Deserialize)]
struct ToolCallWire {
    function: FunctionWire,
}

#[derive(Debug, Deserialize)]
struct FunctionWire {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Splits a byte stream into complete lines.
///
/// Works on bytes so a multi-byte character split across network chunks is
/// reassembled before decoding.
#[derive(Debug, Default)]
struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(nl) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=nl).collect();
            let text = String::from_utf8_lossy(&line[..nl]);
            let text = text.strip_suffix('\r').unwrap_or(&text);
            if !text.trim().is_empty() {
                lines.push(text.to_owned());
            }
        }
        lines
    }

    fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest).trim().to_owned();
        (!text.is_empty()).then_some(text)
    }
}

/// Text carried by one NDJSON line.
#[derive(Debug, Default, PartialEq)]
struct Decoded {
    content: String,
    tool_text: String,
    done: bool,
}

fn decode_line(line: &str) -> Result<Decoded> {
    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| ElysiaError::Llm(format!("malformed stream chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(ElysiaError::Llm(error));
    }
    let (content, tool_text) = match chunk.message {
        Some(message) => (message.content, render_tool_calls(&message.tool_calls)),
        None => (String::new(), String::new()),
    };
    Ok(Decoded {
        content,
        tool_text,
        done: chunk.done,
    })
}

/// Render native tool calls as a `tool_code` block.
fn render_tool_calls(calls: &[ToolCallWire]) -> String {
    if calls.is_empty() {
        return String::new();
    }
    let mut out = format!("\n{TOOL_FENCE_OPEN}\n");
    for call in calls {
        let args = match &call.function.arguments {
            // Some servers send the arguments object JSON-encoded.
            Value::String(raw) => serde_json::from_str(raw).unwrap_or(Value::Null),
            other => other.clone(),
        };
        let rendered: Vec<String> = args
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| format!("{k}={}", to_literal(v)))
                    .collect()
            })
            .unwrap_or_default();
        out.push_str(&format!("{}({})\n", call.function.name, rendered.join(", ")));
    }
    out.push_str(FENCE);
    out.push('\n');
    out
}

/// Turn the NDJSON body into text fragments.
///
/// A read error or an `error` chunk is yielded once and ends the stream.
fn fragment_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    async_stream::stream! {
        let mut bytes = Box::pin(byte_stream);
        let mut lines = LineSplitter::default();
        let mut think = ThinkFilter::default();
        let mut ended = false;

        while !ended {
            let batch = match bytes.next().await {
                Some(Ok(chunk)) => lines.push(&chunk),
                Some(Err(e)) => {
                    yield Err(ElysiaError::Llm(format!("stream read error: {e}")));
                    return;
                }
                None => {
                    ended = true;
                    lines.flush().into_iter().collect()
                }
            };

            for line in batch {
                let decoded = match decode_line(&line) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let mut text = think.push(&decoded.content);
                text.push_str(&decoded.tool_text);
                if !text.is_empty() {
                    debug!(len = text.len(), "fragment");
                    yield Ok(text);
                }
                if decoded.done {
                    ended = true;
                    break;
                }
            }
        }

        let tail = think.finish();
        if !tail.is_empty() {
            yield Ok(tail);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn body_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, reqwest::Error>(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(chunks: Vec<&'static str>) -> Vec<Result<String>> {
        fragment_stream(body_stream(chunks)).collect().await
    }

    #[test]
    fn splitter_joins_partial_lines() {
        let mut s = LineSplitter::default();
        assert!(s.push(b"{\"a\":").is_empty());
        assert_eq!(s.push(b"1}\r\n\n{\"b\""), vec!["{\"a\":1}".to_owned()]);
        assert_eq!(s.flush().as_deref(), Some("{\"b\""));
        assert_eq!(s.flush(), None);
    }

    #[test]
    fn splitter_reassembles_split_utf8() {
        let mut s = LineSplitter::default();
        let bytes = "é\n".as_bytes();
        assert!(s.push(&bytes[..1]).is_empty());
        assert_eq!(s.push(&bytes[1..]), vec!["é".to_owned()]);
    }

    #[test]
    fn decode_content_and_done() {
        let d = decode_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#)
            .unwrap();
        assert_eq!(d.content, "Hi");
        assert!(!d.done);
        let d = decode_line(r#"{"done":true,"total_duration":5}"#).unwrap();
        assert!(d.done);
        assert_eq!(d.content, "");
    }

    #[test]
    fn decode_error_chunk() {
        let err = decode_line(r#"{"error":"model not loaded"}"#).unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
        assert!(decode_line("not json").is_err());
    }

    #[test]
    fn tool_calls_render_as_tool_code() {
        let d = decode_line(
            r#"{"message":{"content":"","tool_calls":[
                {"function":{"name":"create_file","arguments":{"filename":"a.txt","content":"it's"}}},
                {"function":{"name":"list_macros","arguments":"{}"}}
            ]},"done":false}"#,
        )
        .unwrap();
        assert_eq!(
            d.tool_text,
            "\n```tool_code\ncreate_file(content='it\\'s', filename='a.txt')\nlist_macros()\n```\n"
        );
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(
            extract_error_message(r#"{"error":"model 'x' not found"}"#),
            "model 'x' not found"
        );
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(extract_error_message(""), "no response body");
    }

    #[tokio::test]
    async fn fragments_follow_content_and_skip_reasoning() {
        let out = collect(vec![
            "{\"message\":{\"content\":\"<think>plan\"}}\n{\"message\":{\"content\":\"</think>Hello\"}}\n",
            "{\"message\":{\"content\":\" there.\"}}\n{\"done\":true}\n",
            "{\"message\":{\"content\":\"ignored\"}}\n",
        ])
        .await;
        let text: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(text.concat(), "Hello there.");
    }

    #[tokio::test]
    async fn unterminated_body_is_flushed() {
        let out = collect(vec!["{\"message\":{\"content\":\"Tail\"}}"]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "Tail");
    }

    #[tokio::test]
    async fn error_chunk_ends_stream() {
        let out = collect(vec![
            "{\"message\":{\"content\":\"Hi\"}}\n{\"error\":\"boom\"}\n{\"message\":{\"content\":\"x\"}}\n",
        ])
        .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "Hi");
        assert!(out[1].is_err());
    }

    #[test]
    fn body_includes_tools_only_when_given() {
        let model = OllamaModel::new(&LlmConfig::default()).unwrap();
        let plain = model.build_body(&ModelRequest::new("sys", "User: hi"));
        assert!(plain.get("tools").is_none());
        assert_eq!(plain["messages"][0]["content"], "sys");
        assert_eq!(plain["messages"][1]["content"], "User: hi");
        assert_eq!(plain["stream"], true);

        let with_tools = model.build_body(
            &ModelRequest::new("sys", "p").with_tools(crate::tools::registry::schemas_for_api()),
        );
        assert!(with_tools["tools"].as_array().is_some_and(|t| !t.is_empty()));
    }
}
