//! 上游适配器：每个 API 家族一个实现，统一实现 ChatProvider
//!
//! - openai：OpenAI 兼容（OpenAI / Grok / Moonshot / Mistral / Meta，DeepSeek 亦复用）
//! - anthropic：Messages API
//! - google：Gemini generateContent
//! - glm：OpenAI 兼容 + 每次调用签发的 HS256 令牌
//! - ollama：本地服务，请求前探活
//! - nanobanana：端侧模型，不可用时返回模拟响应

pub mod anthropic;
pub mod deepseek;
pub mod glm;
pub mod google;
pub mod nanobanana;
pub mod ollama;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::config::{AiSection, ResolvedProvider};
use crate::core::resilience::RetryConfig;
use crate::memory::session::truncate_with_ellipsis;
use crate::llm::registry::ProviderId;
use crate::llm::traits::{ChatProvider, LlmError};

pub use anthropic::AnthropicProvider;
pub use deepseek::{create_deepseek_provider, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use glm::{generate_glm_token, GlmProvider};
pub use google::GoogleProvider;
pub use nanobanana::NanoBananaProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;

/// 构造适配器所需的全部设置
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub id: ProviderId,
    pub api_key: Option<String>,
    pub base_url: String,
    pub retry: RetryConfig,
    pub probe_timeout: Duration,
}

impl ProviderSettings {
    pub fn new(id: ProviderId, api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            id,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
            probe_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// 需要 Key 却未配置时返回 Auth 错误
    pub(crate) fn require_key(&self) -> Result<&str, LlmError> {
        self.api_key.as_deref().ok_or_else(|| LlmError::Auth {
            provider: self.id,
            message: format!("{} API Key not configured", self.id.display_name()),
        })
    }
}

/// 按 Provider 构造适配器；没有可用 base URL 时返回 None
pub fn build_provider(resolved: &ResolvedProvider, ai: &AiSection) -> Option<Arc<dyn ChatProvider>> {
    let id = resolved.id;
    let base_url = match (&resolved.base_url, id) {
        (Some(url), _) => url.clone(),
        // 端侧模型没有 HTTP 端点也能工作（模拟模式）
        (None, ProviderId::NanoBanana) => String::new(),
        (None, _) => {
            tracing::warn!(provider = %id, "no base_url configured, provider skipped");
            return None;
        }
    };
    let settings = ProviderSettings::new(id, resolved.api_key.clone(), base_url)
        .with_retry(ai.retry.clone())
        .with_probe_timeout(ai.probe_timeout());

    let provider: Arc<dyn ChatProvider> = match id {
        ProviderId::OpenAI
        | ProviderId::Grok
        | ProviderId::Moonshot
        | ProviderId::Mistral
        | ProviderId::Meta => Arc::new(OpenAiCompatProvider::new(settings)),
        ProviderId::DeepSeek => Arc::new(create_deepseek_provider(settings)),
        ProviderId::Anthropic => Arc::new(AnthropicProvider::new(settings)),
        ProviderId::Google => Arc::new(GoogleProvider::new(settings)),
        ProviderId::Glm => Arc::new(GlmProvider::new(settings)),
        ProviderId::Ollama => Arc::new(OllamaProvider::new(settings)),
        ProviderId::NanoBanana => Arc::new(NanoBananaProvider::new(settings)),
    };
    tracing::debug!(provider = %id, "provider adapter initialized");
    Some(provider)
}

/// 共享 HTTP 客户端；单次尝试的截止时间由路由器统一施加
pub(crate) fn http_client() -> Client {
    Client::new()
}

/// POST JSON 并解析 JSON 响应；非 2xx 转为携带状态码与响应体的 Http 错误
pub(crate) async fn post_json(
    client: &Client,
    provider: ProviderId,
    url: &str,
    headers: &[(&str, String)],
    body: &Value,
) -> Result<Value, LlmError> {
    let mut req = client.post(url).json(body);
    for (name, value) in headers {
        req = req.header(*name, value);
    }
    let response = req.send().await.map_err(|e| LlmError::Network {
        provider,
        message: e.to_string(),
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| LlmError::Network {
        provider,
        message: e.to_string(),
    })?;
    if !status.is_success() {
        return Err(LlmError::Http {
            provider,
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
        provider,
        message: format!("{e}: {}", truncate_with_ellipsis(&text, 200)),
    })
}

/// 读取 u64 字段，缺失按 0
pub(crate) fn u64_at(v: &Value, key: &str) -> u64 {
    v.get(key).and_then(Value::as_u64).unwrap_or(0)
}
