//! Async HTTP wrapper around an Anthropic-compatible `/v1/messages`
//! endpoint (§4.10). One-shot per call — no SSE streaming, since the
//! Agent Loop this client serves never needs a partial response.

use std::sync::Arc;
use std::time::Duration;

use am_domain::error::{Error, Result};
use am_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use parking_lot::Mutex;
use serde_json::Value;

use crate::credential::CredentialProvider;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const CALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

impl StopReason {
    fn from_anthropic(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            _ => StopReason::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub stop_reason: StopReason,
    /// Structured content blocks (text + tool_use), for building the
    /// next turn's message window.
    pub content: Vec<ContentPart>,
    /// The raw `content` array as returned by the provider, stored
    /// wholesale in the `iteration_detail` event / `turns` row.
    pub raw_content: Value,
    pub usage: Usage,
}

impl ChatResponse {
    /// The `tool_use` blocks in this response, in order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolUse { id, name, input } => Some(ToolCall {
                    call_id: id.clone(),
                    tool_name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text blocks, truncated to `n` chars (used for the
    /// `llm_response` event preview).
    pub fn text_preview(&self, n: usize) -> String {
        let text: String = self
            .content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        text.chars().take(n).collect()
    }
}

pub struct LlmClient {
    base_url: String,
    default_model: String,
    provider: Arc<dyn CredentialProvider>,
    cached_key: Mutex<Option<String>>,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>, provider: Arc<dyn CredentialProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| Error::Other(format!("building http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
            provider,
            cached_key: Mutex::new(None),
            http,
        })
    }

    /// `chat(messages, model?, system?, tools?, max_tokens=4096)` from
    /// §4.10. On a 401 with a cached key, refreshes once via the
    /// credential provider and retries exactly once; a second 401 is
    /// fatal.
    pub async fn chat(
        &self,
        messages: &[Message],
        model: Option<&str>,
        system: Option<&str>,
        tools: &[ToolDefinition],
        max_tokens: Option<u32>,
    ) -> Result<ChatResponse> {
        let model = model.unwrap_or(&self.default_model).to_string();
        let max_tokens = max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let body = build_messages_body(messages, system, tools, &model, max_tokens);

        let key = self.ensure_key().await?;
        match self.send(&key, &body).await {
            Ok(resp) => Ok(resp),
            Err(Error::Auth(_)) => {
                tracing::warn!("llm call got 401, refreshing credential and retrying once");
                let fresh = self.provider.provide().await?;
                *self.cached_key.lock() = Some(fresh.clone());
                self.send(&fresh, &body).await
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_key(&self) -> Result<String> {
        if let Some(k) = self.cached_key.lock().clone() {
            return Ok(k);
        }
        let fresh = self.provider.provide().await?;
        *self.cached_key.lock() = Some(fresh.clone());
        Ok(fresh)
    }

    async fn send(&self, api_key: &str, body: &Value) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(Error::Auth("llm provider rejected credentials".into()));
        }
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: "anthropic".into(),
                message: format!("HTTP {} - {text}", status.as_u16()),
            });
        }

        let json: Value = serde_json::from_str(&text)?;
        parse_response(&json)
    }
}

fn build_messages_body(messages: &[Message], system: Option<&str>, tools: &[ToolDefinition], model: &str, max_tokens: u32) -> Value {
    let api_messages: Vec<Value> = messages.iter().map(message_to_anthropic).collect();

    let mut body = serde_json::json!({
        "model": model,
        "messages": api_messages,
        "max_tokens": max_tokens,
    });

    if let Some(s) = system {
        body["system"] = Value::String(s.to_string());
    }
    if !tools.is_empty() {
        let tools: Vec<Value> = tools.iter().map(tool_to_anthropic).collect();
        body["tools"] = Value::Array(tools);
    }
    body
}

fn message_to_anthropic(msg: &Message) -> Value {
    match msg.role {
        Role::System => serde_json::json!({"role": "user", "content": msg.content.extract_all_text()}),
        Role::User => user_like_to_anthropic("user", msg),
        Role::Assistant => assistant_to_anthropic(msg),
        Role::Tool => user_like_to_anthropic("user", msg),
    }
}

fn user_like_to_anthropic(role: &str, msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({"role": role, "content": t}),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => serde_json::json!({"type": "text", "text": text}),
                    ContentPart::ToolResult { tool_use_id, content, is_error } => serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": tool_use_id,
                        "content": content,
                        "is_error": is_error,
                    }),
                    ContentPart::Image { url, media_type } => serde_json::json!({
                        "type": "image",
                        "source": {"type": "base64", "media_type": media_type.as_deref().unwrap_or("image/png"), "data": url},
                    }),
                    ContentPart::ToolUse { id, name, input } => serde_json::json!({
                        "type": "tool_use", "id": id, "name": name, "input": input,
                    }),
                })
                .collect();
            serde_json::json!({"role": role, "content": content})
        }
    }
}

fn assistant_to_anthropic(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({"role": "assistant", "content": [{"type": "text", "text": t}]}),
        MessageContent::Parts(_) => user_like_to_anthropic("assistant", msg),
    }
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn parse_response(body: &Value) -> Result<ChatResponse> {
    let raw_content = body.get("content").cloned().unwrap_or(Value::Array(vec![]));
    let blocks = raw_content.as_array().cloned().unwrap_or_default();

    let mut content = Vec::new();
    for block in &blocks {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                    content.push(ContentPart::Text { text: text.to_string() });
                }
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let name = block.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let input = block.get("input").cloned().unwrap_or(Value::Object(Default::default()));
                content.push(ContentPart::ToolUse { id, name, input });
            }
            _ => {}
        }
    }

    let stop_reason = body
        .get("stop_reason")
        .and_then(|v| v.as_str())
        .map(StopReason::from_anthropic)
        .unwrap_or(StopReason::Other);

    let usage = body
        .get("usage")
        .map(|u| Usage {
            input_tokens: u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            output_tokens: u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        stop_reason,
        content,
        raw_content,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(StopReason::from_anthropic("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::from_anthropic("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::from_anthropic("max_tokens"), StopReason::MaxTokens);
        assert_eq!(StopReason::from_anthropic("weird"), StopReason::Other);
    }

    #[test]
    fn parses_text_and_tool_use_blocks() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "tool_use", "id": "t1", "name": "read_file", "input": {"path": "a.txt"}},
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 20},
        });
        let resp = parse_response(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.usage.input_tokens, 10);
        assert_eq!(resp.usage.output_tokens, 20);
        assert_eq!(resp.tool_calls().len(), 1);
        assert_eq!(resp.text_preview(100), "hello");
    }

    #[test]
    fn text_preview_truncates() {
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "a".repeat(600)}],
            "stop_reason": "end_turn",
        });
        let resp = parse_response(&body).unwrap();
        assert_eq!(resp.text_preview(500).len(), 500);
    }
}
