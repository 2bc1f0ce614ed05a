//! OpenAI 兼容适配器
//!
//! POST `{base}/chat/completions`，Bearer 鉴权；系统提示作为首条 system 消息注入；
//! 工具包装为 `{type:"function", function:{...}}`；tool_calls 的 arguments 为 JSON 字符串，解码后返回。
//! DeepSeek 的 reasoning_content 作为 thinking 返回。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{http_client, post_json, u64_at, ProviderSettings};
use crate::core::resilience::with_retry;
use crate::llm::registry::ProviderId;
use crate::llm::traits::{ChatProvider, LlmError};
use crate::llm::types::{decode_args, ChatRequest, ChatResponse, ToolCall, Usage};

pub struct OpenAiCompatProvider {
    client: Client,
    settings: ProviderSettings,
}

impl OpenAiCompatProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            client: http_client(),
            settings,
        }
    }

    pub fn id(&self) -> ProviderId {
        self.settings.id
    }

    pub(crate) fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// 以指定 Bearer 令牌发送一次（不重试）
    pub(crate) async fn send_once(&self, body: &Value, bearer: Option<&str>) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/chat/completions", self.settings.base_url);
        let headers: Vec<(&str, String)> = bearer
            .map(|t| vec![("Authorization", format!("Bearer {t}"))])
            .unwrap_or_default();
        let data = post_json(&self.client, self.settings.id, &url, &headers, body).await?;
        parse_response(self.settings.id, &data)
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let key = if self.settings.id.requires_api_key() {
            Some(self.settings.require_key()?.to_string())
        } else {
            self.settings.api_key.clone()
        };
        let body = build_body(request);
        with_retry(|| self.send_once(&body, key.as_deref()), &self.settings.retry).await
    }
}

/// 规范请求 -> chat/completions 请求体
pub(crate) fn build_body(request: &ChatRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.extend(
        request
            .messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content})),
    );

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "stream": false,
    });
    if request.model == "gpt-5.2-pro" {
        body["reasoning_effort"] = json!("high");
    }
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        );
    }
    body
}

/// chat/completions 响应 -> 规范响应
pub(crate) fn parse_response(provider: ProviderId, data: &Value) -> Result<ChatResponse, LlmError> {
    let message = data
        .pointer("/choices/0/message")
        .ok_or_else(|| LlmError::InvalidResponse {
            provider,
            message: "missing choices[0].message".to_string(),
        })?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let thinking = message
        .get("reasoning_content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(i, tc)| ToolCall {
                    id: tc
                        .get("id")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .unwrap_or_else(|| format!("call_{i}")),
                    name: tc
                        .pointer("/function/name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    args: decode_args(tc.pointer("/function/arguments").unwrap_or(&Value::Null)),
                })
                .collect()
        })
        .unwrap_or_default();
    let usage = data.get("usage").map(|u| Usage {
        input_tokens: u64_at(u, "prompt_tokens"),
        output_tokens: u64_at(u, "completion_tokens"),
        total_tokens: u64_at(u, "total_tokens").max(u64_at(u, "prompt_tokens") + u64_at(u, "completion_tokens")),
    });

    Ok(ChatResponse {
        text,
        tool_calls,
        thinking,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ToolDeclaration;
    use crate::memory::Message;

    #[test]
    fn test_body_shape() {
        let req = ChatRequest::new("gpt-5.2-pro", vec![Message::user("hi"), Message::assistant("yo")])
            .with_system("be brief")
            .with_tools(vec![ToolDeclaration {
                name: "web_search".into(),
                description: "search".into(),
                parameters: json!({"type": "object"}),
            }]);
        let body = build_body(&req);
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert_eq!(body["reasoning_effort"], "high");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_no_tools_no_effort_for_regular_models() {
        let body = build_body(&ChatRequest::new("gpt-5.2", vec![Message::user("hi")]));
        assert!(body.get("tools").is_none());
        assert!(body.get("reasoning_effort").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_tool_calls_and_reasoning() {
        let data = json!({
            "choices": [{"message": {
                "content": null,
                "reasoning_content": "let me think",
                "tool_calls": [{"id": "c1", "type": "function",
                    "function": {"name": "web_search", "arguments": "{\"query\":\"rust\"}"}}]
            }}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let resp = parse_response(ProviderId::DeepSeek, &data).unwrap();
        assert_eq!(resp.text, "");
        assert_eq!(resp.thinking.as_deref(), Some("let me think"));
        assert_eq!(resp.tool_calls[0].args, json!({"query": "rust"}));
        assert_eq!(resp.usage, Some(Usage::new(10, 5)));
    }

    #[test]
    fn test_parse_rejects_missing_choices() {
        let err = parse_response(ProviderId::OpenAI, &json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }
}
