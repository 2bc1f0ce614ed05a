//! Ollama 本地适配器
//!
//! 本地守护进程不保证在线：每次请求前 GET `<root>/api/tags` 探活，失败立即返回 Unreachable。
//! 线上格式为 OpenAI 兼容；重试更宽松（1 次，首轮 500ms）。

use async_trait::async_trait;
use reqwest::Client;

use super::openai::build_body;
use super::{http_client, OpenAiCompatProvider, ProviderSettings};
use crate::core::resilience::{with_retry, RetryConfig};
use crate::llm::registry::ProviderId;
use crate::llm::traits::{ChatProvider, LlmError};
use crate::llm::types::{ChatRequest, ChatResponse};

pub struct OllamaProvider {
    client: Client,
    inner: OpenAiCompatProvider,
    probe_url: String,
}

impl OllamaProvider {
    pub fn new(mut settings: ProviderSettings) -> Self {
        settings.id = ProviderId::Ollama;
        settings.retry = RetryConfig {
            max_delay_ms: settings.retry.max_delay_ms,
            factor: settings.retry.factor,
            max_jitter_ms: settings.retry.max_jitter_ms,
            ..RetryConfig::local()
        };
        let probe_url = probe_url(&settings.base_url);
        Self {
            client: http_client(),
            inner: OpenAiCompatProvider::new(settings),
            probe_url,
        }
    }

    /// 探活：在 probe_timeout 内返回 2xx 即视为在线
    pub async fn check_connection(&self) -> bool {
        let timeout = self.inner.settings().probe_timeout;
        match self.client.get(&self.probe_url).timeout(timeout).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %self.probe_url, error = %e, "ollama probe failed");
                false
            }
        }
    }
}

/// `http://host:11434/v1` -> `http://host:11434/api/tags`
fn probe_url(base_url: &str) -> String {
    let root = base_url.strip_suffix("/v1").unwrap_or(base_url);
    format!("{root}/api/tags")
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        if !self.check_connection().await {
            return Err(LlmError::Unreachable {
                provider: ProviderId::Ollama,
                url: self.probe_url.clone(),
            });
        }
        let body = build_body(request);
        let key = self.inner.settings().api_key.clone();
        with_retry(
            || self.inner.send_once(&body, key.as_deref()),
            &self.inner.settings().retry,
        )
        .await
    }
}
