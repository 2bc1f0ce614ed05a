//! Nano Banana 端侧适配器
//!
//! 没有云端对话接口：配置了本机运行时端点时，把历史拼成单条 prompt 发给 `{base}/prompt`；
//! 端点缺失或出错时返回带标注的模拟响应，而不是让整个运行失败。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{http_client, post_json, ProviderSettings};
use crate::llm::registry::ProviderId;
use crate::llm::traits::{ChatProvider, LlmError};
use crate::llm::types::{ChatRequest, ChatResponse, Usage};

const SIMULATED_TOTAL_TOKENS: u64 = 50;

pub struct NanoBananaProvider {
    client: Client,
    settings: ProviderSettings,
}

impl NanoBananaProvider {
    pub fn new(mut settings: ProviderSettings) -> Self {
        settings.id = ProviderId::NanoBanana;
        Self {
            client: http_client(),
            settings,
        }
    }

    async fn native(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/prompt", self.settings.base_url);
        let body = json!({
            "systemPrompt": request.system_prompt,
            "prompt": flatten_prompt(request),
        });
        let headers: Vec<(&str, String)> = self
            .settings
            .api_key
            .as_ref()
            .map(|k| vec![("Authorization", format!("Bearer {k}"))])
            .unwrap_or_default();
        let data = post_json(&self.client, ProviderId::NanoBanana, &url, &headers, &body).await?;
        let text = data
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: ProviderId::NanoBanana,
                message: "missing text".to_string(),
            })?;
        Ok(ChatResponse {
            text: text.to_string(),
            usage: Some(Usage::default()),
            ..ChatResponse::default()
        })
    }
}

/// 端侧会话只接受单条 prompt：`role: content` 逐行拼接
fn flatten_prompt(request: &ChatRequest) -> String {
    request
        .messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn simulated_response(model: &str, note: &str) -> ChatResponse {
    ChatResponse {
        text: format!(
            "[Nano Banana Edge]: {note}\n\nProcessed request for {model}. (Simulated Response)"
        ),
        usage: Some(Usage {
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: SIMULATED_TOTAL_TOKENS,
        }),
        ..ChatResponse::default()
    }
}

#[async_trait]
impl ChatProvider for NanoBananaProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        if self.settings.base_url.is_empty() {
            return Ok(simulated_response(
                &request.model,
                "On-device runtime not configured. Running in simulation mode.",
            ));
        }
        match self.native(request).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                tracing::warn!(error = %e, "on-device runtime error, falling back to simulation");
                Ok(simulated_response(&request.model, &format!("On-device runtime error: {e}")))
            }
        }
    }
}
