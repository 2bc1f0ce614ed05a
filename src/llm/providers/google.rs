//! Google Gemini 适配器（generateContent）
//!
//! 角色映射为 user / model；系统提示走 systemInstruction；工具走 functionDeclarations；
//! gemini-3 与 deep-think 模型附带 4096 的思考预算，thought 部分作为 thinking 返回。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{http_client, post_json, u64_at, ProviderSettings};
use crate::core::resilience::with_retry;
use crate::llm::registry::ProviderId;
use crate::llm::traits::{ChatProvider, LlmError};
use crate::llm::types::{decode_args, ChatRequest, ChatResponse, ToolCall, Usage};
use crate::memory::Role;

const THINKING_BUDGET: u32 = 4096;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GoogleProvider {
    client: Client,
    settings: ProviderSettings,
}

impl GoogleProvider {
    pub fn new(mut settings: ProviderSettings) -> Self {
        settings.id = ProviderId::Google;
        Self {
            client: http_client(),
            settings,
        }
    }

    async fn send_once(&self, key: &str, model: &str, body: &Value) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.settings.base_url, model);
        let headers = [("x-goog-api-key", key.to_string())];
        let data = post_json(&self.client, ProviderId::Google, &url, &headers, body).await?;
        parse_response(&data)
    }
}

#[async_trait]
impl ChatProvider for GoogleProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let key = self.settings.require_key()?;
        let body = build_body(request);
        with_retry(
            || self.send_once(key, &request.model, &body),
            &self.settings.retry,
        )
        .await
    }
}

fn is_thinking_model(model: &str) -> bool {
    model.contains("deep-think") || model.contains("gemini-3")
}

fn build_body(request: &ChatRequest) -> Value {
    let mut system_parts: Vec<&str> = request.system_prompt.iter().map(String::as_str).collect();
    let mut contents = Vec::with_capacity(request.messages.len());
    for m in &request.messages {
        let role = match m.role {
            Role::User => "user",
            Role::Assistant => "model",
            Role::System => {
                system_parts.push(&m.content);
                continue;
            }
        };
        contents.push(json!({"role": role, "parts": [{"text": m.content}]}));
    }

    let mut body = json!({
        "contents": contents,
        "safetySettings": SAFETY_CATEGORIES
            .iter()
            .map(|c| json!({"category": c, "threshold": "BLOCK_NONE"}))
            .collect::<Vec<_>>(),
    });
    if !system_parts.is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": system_parts.join("\n\n")}]});
    }
    if !request.tools.is_empty() {
        let decls: Vec<Value> = request
            .tools
            .iter()
            .map(|t| json!({"name": t.name, "description": t.description, "parameters": t.parameters}))
            .collect();
        body["tools"] = json!([{"functionDeclarations": decls}]);
    }
    if is_thinking_model(&request.model) {
        body["generationConfig"] = json!({
            "thinkingConfig": {"thinkingBudget": THINKING_BUDGET, "includeThoughts": true}
        });
    }
    body
}

fn parse_response(data: &Value) -> Result<ChatResponse, LlmError> {
    let candidate = data
        .pointer("/candidates/0")
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: ProviderId::Google,
            message: "missing candidates[0]".to_string(),
        })?;
    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut text = String::new();
    let mut thinking: Option<String> = None;
    let mut tool_calls = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if let Some(call) = part.get("functionCall") {
            let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            tool_calls.push(ToolCall {
                id: call
                    .get("id")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| format!("{name}-{i}")),
                name: name.to_string(),
                args: decode_args(call.get("args").unwrap_or(&Value::Null)),
            });
            continue;
        }
        let Some(t) = part.get("text").and_then(Value::as_str) else {
            continue;
        };
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            // 只保留第一段思考
            if thinking.is_none() {
                thinking = Some(t.to_string());
            }
        } else {
            text.push_str(t);
        }
    }

    let usage = data.get("usageMetadata").map(|u| Usage {
        input_tokens: u64_at(u, "promptTokenCount"),
        output_tokens: u64_at(u, "candidatesTokenCount"),
        total_tokens: u64_at(u, "totalTokenCount"),
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
    fn test_roles_and_thinking_budget() {
        let req = ChatRequest::new(
            "gemini-3-pro-preview",
            vec![Message::user("q"), Message::assistant("a"), Message::user("q2")],
        )
        .with_system("sys")
        .with_tools(vec![ToolDeclaration {
            name: "web_search".into(),
            description: "d".into(),
            parameters: json!({"type": "object"}),
        }]);
        let body = build_body(&req);
        let roles: Vec<&str> = body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "web_search");
        assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], 4096);
    }

    #[test]
    fn test_no_thinking_for_older_models() {
        assert!(!is_thinking_model("gemini-2.5-flash"));
        assert!(is_thinking_model("gemini-3-deep-think"));
    }

    #[test]
    fn test_parse_parts() {
        let data = json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "pondering", "thought": true},
                {"text": "Answer "},
                {"text": "here"},
                {"functionCall": {"name": "web_search", "args": {"query": "x"}}}
            ]}}],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 4, "totalTokenCount": 9}
        });
        let resp = parse_response(&data).unwrap();
        assert_eq!(resp.text, "Answer here");
        assert_eq!(resp.thinking.as_deref(), Some("pondering"));
        assert_eq!(resp.tool_calls[0].id, "web_search-3");
        assert_eq!(resp.tool_calls[0].args, json!({"query": "x"}));
        assert_eq!(resp.usage.unwrap().total_tokens, 9);
    }
}
