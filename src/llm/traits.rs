//! 聊天后端抽象
//!
//! 所有上游适配器与路由器本身都实现 ChatProvider；错误统一为 LlmError，
//! 其 Display 携带 HTTP 状态码与响应体，供重试层和路由器按文本判断认证失败。

use async_trait::async_trait;
use thiserror::Error;

use crate::core::resilience::is_auth_failure;
use crate::llm::registry::{Capability, ProviderId};
use crate::llm::types::{ChatRequest, ChatResponse};

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("{provider} authentication error: {message}")]
    Auth { provider: ProviderId, message: String },

    #[error("{provider} API error (HTTP {status}): {body}")]
    Http {
        provider: ProviderId,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {message}")]
    Network { provider: ProviderId, message: String },

    #[error("{provider} server not reachable at {url}")]
    Unreachable { provider: ProviderId, url: String },

    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse { provider: ProviderId, message: String },

    #[error("{provider} request timed out after {secs}s")]
    Timeout { provider: ProviderId, secs: u64 },

    #[error("Model {0} not found in registry.")]
    ModelNotFound(String),

    #[error("Provider {0} not initialized.")]
    ProviderNotConfigured(ProviderId),

    #[error("No available model supports required capabilities: {}", join_caps(.missing))]
    CapabilityUnsatisfied { model: String, missing: Vec<Capability> },

    #[error("Authentication failed for {model}. Please check settings.")]
    AuthenticationFailed { model: String },
}

fn join_caps(caps: &[Capability]) -> String {
    caps.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

impl LlmError {
    /// 认证类错误：不重试、不回退
    pub fn is_auth(&self) -> bool {
        match self {
            LlmError::Auth { .. } | LlmError::AuthenticationFailed { .. } => true,
            LlmError::Http { status, body, .. } => {
                *status == 401 || *status == 403 || is_auth_failure(body)
            }
            _ => false,
        }
    }

    /// 出错的上游（路由层错误没有）
    pub fn provider(&self) -> Option<ProviderId> {
        match self {
            LlmError::Auth { provider, .. }
            | LlmError::Http { provider, .. }
            | LlmError::Network { provider, .. }
            | LlmError::Unreachable { provider, .. }
            | LlmError::InvalidResponse { provider, .. }
            | LlmError::Timeout { provider, .. } => Some(*provider),
            LlmError::ProviderNotConfigured(p) => Some(*p),
            _ => None,
        }
    }
}

/// 聊天后端：一次请求得到一次规范响应
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}
