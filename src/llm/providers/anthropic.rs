//! Anthropic Messages API 适配器
//!
//! 系统提示放在顶层 `system` 字段，消息中不得出现 system 角色；工具声明为
//! `{name, description, input_schema}`；响应按 content block 解析 text / thinking / tool_use。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{http_client, post_json, u64_at, ProviderSettings};
use crate::core::resilience::with_retry;
use crate::llm::registry::ProviderId;
use crate::llm::traits::{ChatProvider, LlmError};
use crate::llm::types::{decode_args, ChatRequest, ChatResponse, ToolCall, Usage};
use crate::memory::Role;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;

pub struct AnthropicProvider {
    client: Client,
    settings: ProviderSettings,
}

impl AnthropicProvider {
    pub fn new(mut settings: ProviderSettings) -> Self {
        settings.id = ProviderId::Anthropic;
        Self {
            client: http_client(),
            settings,
        }
    }

    async fn send_once(&self, key: &str, body: &Value) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/messages", self.settings.base_url);
        let headers = [
            ("x-api-key", key.to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ];
        let data = post_json(&self.client, ProviderId::Anthropic, &url, &headers, body).await?;
        parse_response(&data)
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let key = self.settings.require_key()?;
        let body = build_body(request);
        with_retry(|| self.send_once(key, &body), &self.settings.retry).await
    }
}

fn build_body(request: &ChatRequest) -> Value {
    // system 角色消息并入顶层 system 字段
    let mut system_parts: Vec<&str> = request.system_prompt.iter().map(String::as_str).collect();
    let mut messages = Vec::with_capacity(request.messages.len());
    for m in &request.messages {
        match m.role {
            Role::System => system_parts.push(&m.content),
            Role::User | Role::Assistant => {
                messages.push(json!({"role": m.role.as_str(), "content": m.content}))
            }
        }
    }

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": MAX_TOKENS,
    });
    if !system_parts.is_empty() {
        body["system"] = json!(system_parts.join("\n\n"));
    }
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect(),
        );
    }
    body
}

fn parse_response(data: &Value) -> Result<ChatResponse, LlmError> {
    let blocks = data
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: ProviderId::Anthropic,
            message: "missing content blocks".to_string(),
        })?;

    let mut text = Vec::new();
    let mut thinking = Vec::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push(t);
                }
            }
            Some("thinking") => {
                if let Some(t) = block.get("thinking").and_then(Value::as_str) {
                    thinking.push(t);
                }
            }
            Some("tool_use") => tool_calls.push(ToolCall {
                id: block.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: block.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                args: decode_args(block.get("input").unwrap_or(&Value::Null)),
            }),
            _ => {}
        }
    }

    let usage = data
        .get("usage")
        .map(|u| Usage::new(u64_at(u, "input_tokens"), u64_at(u, "output_tokens")));

    Ok(ChatResponse {
        text: text.join("\n"),
        tool_calls,
        thinking: (!thinking.is_empty()).then(|| thinking.join("\n")),
        usage,
    })
}
