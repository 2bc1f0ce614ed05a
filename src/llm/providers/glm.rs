//! 智谱 GLM 适配器
//!
//! 线上格式与 OpenAI 兼容，但鉴权使用由 `id.secret` 形式的长期 Key 派生的 HS256 令牌；
//! 令牌有效期一小时，每次发送前重新签发，不缓存。

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use super::openai::build_body;
use super::{OpenAiCompatProvider, ProviderSettings};
use crate::core::resilience::with_retry;
use crate::llm::registry::ProviderId;
use crate::llm::traits::{ChatProvider, LlmError};
use crate::llm::types::{ChatRequest, ChatResponse};

/// 令牌有效期（毫秒）
pub const GLM_TOKEN_TTL_MS: i64 = 3_600_000;

type HmacSha256 = Hmac<Sha256>;

/// 由 `id.secret` 签发 JWT：header `{alg:HS256, sign_type:SIGN}`，
/// payload `{api_key: id, exp: now+1h, timestamp: now}`（毫秒）
pub fn generate_glm_token(api_key: &str, now_ms: i64) -> Result<String, LlmError> {
    let invalid = || LlmError::Auth {
        provider: ProviderId::Glm,
        message: "Invalid GLM API Key format (expected id.secret)".to_string(),
    };
    let (id, secret) = api_key.split_once('.').ok_or_else(invalid)?;
    if id.is_empty() || secret.is_empty() {
        return Err(invalid());
    }

    let header = json!({"alg": "HS256", "sign_type": "SIGN"});
    let payload = json!({
        "api_key": id,
        "exp": now_ms + GLM_TOKEN_TTL_MS,
        "timestamp": now_ms,
    });
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    );

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| invalid())?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{signing_input}.{signature}"))
}

pub struct GlmProvider {
    inner: OpenAiCompatProvider,
}

impl GlmProvider {
    pub fn new(mut settings: ProviderSettings) -> Self {
        settings.id = ProviderId::Glm;
        Self {
            inner: OpenAiCompatProvider::new(settings),
        }
    }
}

#[async_trait]
impl ChatProvider for GlmProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let settings = self.inner.settings();
        let key = settings.require_key()?.to_string();
        let body = build_body(request);
        with_retry(
            || {
                let key = key.clone();
                let body = &body;
                async move {
                    let token = generate_glm_token(&key, chrono::Utc::now().timestamp_millis())?;
                    self.inner.send_once(body, Some(&token)).await
                }
            },
            &settings.retry,
        )
        .await
    }
}
