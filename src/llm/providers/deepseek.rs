//! DeepSeek 适配器（OpenAI 兼容格式）
//!
//! DeepSeek 提供与 OpenAI 兼容的 chat/completions 接口。
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式，reasoning_content 作为 thinking 返回)

use super::{OpenAiCompatProvider, ProviderSettings};
use crate::llm::registry::ProviderId;

/// DeepSeek API 常量
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 适配器
///
/// - Key 缺失时回退环境变量 `DEEPSEEK_API_KEY`
/// - base_url 为空时使用官方端点
pub fn create_deepseek_provider(mut settings: ProviderSettings) -> OpenAiCompatProvider {
    settings.id = ProviderId::DeepSeek;
    if settings.api_key.is_none() {
        settings.api_key = std::env::var("DEEPSEEK_API_KEY").ok().filter(|k| !k.is_empty());
    }
    if settings.base_url.is_empty() {
        settings.base_url = DEEPSEEK_BASE_URL.to_string();
    }
    OpenAiCompatProvider::new(settings)
}
