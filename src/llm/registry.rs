//! 模型注册表：进程启动即确定的静态模型目录
//!
//! 每个模型标注所属 Provider、上下文窗口、每百万 token 价格与能力集合；
//! 路由器用它做查找与能力替换搜索。只读，无副作用。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 模型可选能力
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Vision,
    ToolCalling,
    Reasoning,
    Streaming,
    ComputerUse,
    RealTimeSearch,
    ThinkingInTools,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Vision => "vision",
            Capability::ToolCalling => "toolCalling",
            Capability::Reasoning => "reasoning",
            Capability::Streaming => "streaming",
            Capability::ComputerUse => "computerUse",
            Capability::RealTimeSearch => "realTimeSearch",
            Capability::ThinkingInTools => "thinkingInTools",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 上游 API 家族
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    Anthropic,
    Google,
    DeepSeek,
    Grok,
    Moonshot,
    Glm,
    Ollama,
    NanoBanana,
    Mistral,
    Meta,
}

impl ProviderId {
    pub const ALL: [ProviderId; 11] = [
        ProviderId::OpenAI,
        ProviderId::Anthropic,
        ProviderId::Google,
        ProviderId::DeepSeek,
        ProviderId::Grok,
        ProviderId::Moonshot,
        ProviderId::Glm,
        ProviderId::Ollama,
        ProviderId::NanoBanana,
        ProviderId::Mistral,
        ProviderId::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Google => "google",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Grok => "grok",
            ProviderId::Moonshot => "moonshot",
            ProviderId::Glm => "glm",
            ProviderId::Ollama => "ollama",
            ProviderId::NanoBanana => "nanobanana",
            ProviderId::Mistral => "mistral",
            ProviderId::Meta => "meta",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OpenAI",
            ProviderId::Anthropic => "Anthropic",
            ProviderId::Google => "Google Gemini",
            ProviderId::DeepSeek => "DeepSeek",
            ProviderId::Grok => "xAI Grok",
            ProviderId::Moonshot => "Moonshot AI",
            ProviderId::Glm => "Zhipu GLM",
            ProviderId::Ollama => "Ollama (Local)",
            ProviderId::NanoBanana => "Nano Banana",
            ProviderId::Mistral => "Mistral AI",
            ProviderId::Meta => "Meta AI",
        }
    }

    /// 默认 API 根地址；None 表示必须由配置提供（或该 Provider 无 HTTP 端点）
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderId::OpenAI => Some("https://api.openai.com/v1"),
            ProviderId::Anthropic => Some("https://api.anthropic.com/v1"),
            ProviderId::Google => Some("https://generativelanguage.googleapis.com/v1beta"),
            ProviderId::DeepSeek => Some("https://api.deepseek.com"),
            ProviderId::Grok => Some("https://api.x.ai/v1"),
            ProviderId::Moonshot => Some("https://api.moonshot.cn/v1"),
            ProviderId::Glm => Some("https://open.bigmodel.cn/api/paas/v4"),
            ProviderId::Ollama => Some("http://localhost:11434/v1"),
            ProviderId::Mistral => Some("https://api.mistral.ai/v1"),
            ProviderId::NanoBanana | ProviderId::Meta => None,
        }
    }

    /// 未在配置中写 api_key 时读取的环境变量
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderId::OpenAI => &["OPENAI_API_KEY"],
            ProviderId::Anthropic => &["ANTHROPIC_API_KEY"],
            ProviderId::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            ProviderId::DeepSeek => &["DEEPSEEK_API_KEY"],
            ProviderId::Grok => &["XAI_API_KEY"],
            ProviderId::Moonshot => &["MOONSHOT_API_KEY"],
            ProviderId::Glm => &["GLM_API_KEY"],
            ProviderId::Ollama => &[],
            ProviderId::NanoBanana => &["NANOBANANA_API_KEY"],
            ProviderId::Mistral => &["MISTRAL_API_KEY"],
            ProviderId::Meta => &["META_API_KEY"],
        }
    }

    /// 是否需要 API Key 才能调用
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderId::Ollama | ProviderId::NanoBanana)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模型描述（不可变）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Model {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: ProviderId,
    pub context_window: u32,
    /// 每百万输入 token 价格（USD）
    pub input_price: f64,
    /// 每百万输出 token 价格（USD）
    pub output_price: f64,
    pub capabilities: &'static [Capability],
    pub badges: &'static [&'static str],
    pub description: Option<&'static str>,
}

impl Model {
    pub fn supports(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn supports_all(&self, caps: &[Capability]) -> bool {
        caps.iter().all(|c| self.supports(*c))
    }

    /// 本模型缺少的能力（保持请求中的顺序）
    pub fn missing(&self, caps: &[Capability]) -> Vec<Capability> {
        caps.iter().copied().filter(|c| !self.supports(*c)).collect()
    }

    /// 按 token 数估算费用（USD）
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_price + output_tokens as f64 * self.output_price)
            / 1_000_000.0
    }
}

use Capability::*;

static MODELS: &[Model] = &[
    // Google Gemini
    Model {
        id: "gemini-3-flash-preview",
        name: "Gemini 3 Flash",
        provider: ProviderId::Google,
        context_window: 2_000_000,
        input_price: 0.50,
        output_price: 3.00,
        capabilities: &[Vision, ToolCalling, Streaming],
        badges: &["Default", "2M Context"],
        description: Some("Fast, multimodal, huge context window."),
    },
    Model {
        id: "gemini-3-pro-preview",
        name: "Gemini 3 Pro",
        provider: ProviderId::Google,
        context_window: 2_000_000,
        input_price: 2.50,
        output_price: 10.00,
        capabilities: &[Vision, ToolCalling, Reasoning, Streaming],
        badges: &["Reasoning"],
        description: Some("Complex reasoning and heavy tasks."),
    },
    Model {
        id: "gemini-3-deep-think",
        name: "Gemini 3 Deep Think",
        provider: ProviderId::Google,
        context_window: 2_000_000,
        input_price: 5.00,
        output_price: 15.00,
        capabilities: &[Vision, ToolCalling, Reasoning, Streaming],
        badges: &["Max Reasoning"],
        description: Some("Maximum reasoning depth."),
    },
    // OpenAI
    Model {
        id: "gpt-5.2",
        name: "GPT-5.2",
        provider: ProviderId::OpenAI,
        context_window: 256_000,
        input_price: 1.75,
        output_price: 14.00,
        capabilities: &[Vision, ToolCalling, Reasoning, Streaming],
        badges: &["Flagship"],
        description: Some("The standard for high intelligence."),
    },
    Model {
        id: "gpt-5.2-pro",
        name: "GPT-5.2 Pro",
        provider: ProviderId::OpenAI,
        context_window: 256_000,
        input_price: 5.00,
        output_price: 30.00,
        capabilities: &[Vision, ToolCalling, Reasoning, Streaming],
        badges: &["Max Reasoning"],
        description: Some("Extended thinking for complex problems."),
    },
    Model {
        id: "gpt-5.2-codex",
        name: "GPT-5.2 Codex",
        provider: ProviderId::OpenAI,
        context_window: 128_000,
        input_price: 1.50,
        output_price: 12.00,
        capabilities: &[ToolCalling, Streaming],
        badges: &["Coding"],
        description: Some("Specialized for software engineering."),
    },
    Model {
        id: "gpt-image-1.5",
        name: "GPT Image 1.5",
        provider: ProviderId::OpenAI,
        context_window: 4_096,
        input_price: 0.04,
        output_price: 0.04,
        capabilities: &[Vision],
        badges: &["Image Gen"],
        description: Some("4x faster image generation."),
    },
    // Anthropic
    Model {
        id: "claude-opus-4-5-20251101",
        name: "Claude 4.5 Opus",
        provider: ProviderId::Anthropic,
        context_window: 200_000,
        input_price: 5.00,
        output_price: 25.00,
        capabilities: &[Vision, ToolCalling, ComputerUse, Streaming, Reasoning],
        badges: &["Deep Thinker"],
        description: Some("Highest capability for nuanced tasks."),
    },
    Model {
        id: "claude-sonnet-4-5-20250929",
        name: "Claude 4.5 Sonnet",
        provider: ProviderId::Anthropic,
        context_window: 200_000,
        input_price: 3.00,
        output_price: 15.00,
        capabilities: &[Vision, ToolCalling, ComputerUse, Streaming],
        badges: &["Balanced"],
        description: Some("Best balance of intelligence and speed."),
    },
    Model {
        id: "claude-haiku-4-5",
        name: "Claude 4.5 Haiku",
        provider: ProviderId::Anthropic,
        context_window: 200_000,
        input_price: 0.25,
        output_price: 1.25,
        capabilities: &[Vision, ToolCalling, Streaming],
        badges: &["Fast"],
        description: Some("Fast and cost-effective."),
    },
    // DeepSeek
    Model {
        id: "deepseek-chat",
        name: "DeepSeek V3.2",
        provider: ProviderId::DeepSeek,
        context_window: 128_000,
        input_price: 0.28,
        output_price: 1.10,
        capabilities: &[ToolCalling, ThinkingInTools, Streaming],
        badges: &["Best Value"],
        description: Some("Incredible performance per dollar."),
    },
    Model {
        id: "deepseek-reasoner",
        name: "DeepSeek V3.2 Speciale",
        provider: ProviderId::DeepSeek,
        context_window: 128_000,
        input_price: 0.50,
        output_price: 2.00,
        capabilities: &[Reasoning, ToolCalling, Streaming, ThinkingInTools],
        badges: &["Gold Medal Logic"],
        description: Some("Top-tier reasoning performance."),
    },
    // xAI Grok
    Model {
        id: "grok-beta",
        name: "Grok 4.1",
        provider: ProviderId::Grok,
        context_window: 256_000,
        input_price: 5.00,
        output_price: 15.00,
        capabilities: &[ToolCalling, RealTimeSearch, Vision, Streaming],
        badges: &["Real-time Search"],
        description: Some("Access to real-time X platform data."),
    },
    Model {
        id: "grok-voice",
        name: "Grok Voice",
        provider: ProviderId::Grok,
        context_window: 128_000,
        input_price: 4.00,
        output_price: 12.00,
        capabilities: &[Streaming],
        badges: &["Audio"],
        description: Some("Fastest <1s latency audio model."),
    },
    // Moonshot (Kimi)
    Model {
        id: "moonshot-v1-128k",
        name: "Kimi K2 (Moonshot)",
        provider: ProviderId::Moonshot,
        context_window: 200_000,
        input_price: 1.6,
        output_price: 1.6,
        capabilities: &[ToolCalling, Streaming],
        badges: &["Chinese SOTA"],
        description: Some("Excellent Chinese/English bilingual."),
    },
    // Zhipu GLM
    Model {
        id: "glm-4.7",
        name: "GLM 4.7",
        provider: ProviderId::Glm,
        context_window: 128_000,
        input_price: 1.0,
        output_price: 1.0,
        capabilities: &[Vision, ToolCalling, Streaming],
        badges: &["GLM"],
        description: Some("Strong general purpose model."),
    },
    Model {
        id: "glm-4v",
        name: "GLM 4V",
        provider: ProviderId::Glm,
        context_window: 128_000,
        input_price: 1.0,
        output_price: 1.0,
        capabilities: &[Vision, Streaming],
        badges: &["Vision"],
        description: Some("Specialized vision model."),
    },
    // Ollama（本地）
    Model {
        id: "llama3.3",
        name: "Llama 3.3 (Local)",
        provider: ProviderId::Ollama,
        context_window: 32_000,
        input_price: 0.0,
        output_price: 0.0,
        capabilities: &[ToolCalling, Streaming],
        badges: &["Private"],
        description: Some("Runs locally. Requires Ollama."),
    },
    Model {
        id: "mistral-large",
        name: "Mistral Large (Local)",
        provider: ProviderId::Ollama,
        context_window: 32_000,
        input_price: 0.0,
        output_price: 0.0,
        capabilities: &[ToolCalling, Streaming],
        badges: &["Private"],
        description: Some("Runs locally."),
    },
    // Nano Banana（端侧）
    Model {
        id: "nanobanana-pro",
        name: "Nano Banana Pro",
        provider: ProviderId::NanoBanana,
        context_window: 4_096,
        input_price: 0.1,
        output_price: 0.1,
        capabilities: &[Vision],
        badges: &["Edge Image Gen"],
        description: Some("Studio-quality edge generation."),
    },
    // Mistral AI
    Model {
        id: "mistral-large-latest",
        name: "Mistral Large 2",
        provider: ProviderId::Mistral,
        context_window: 128_000,
        input_price: 2.0,
        output_price: 6.0,
        capabilities: &[ToolCalling, Streaming],
        badges: &["EU Flagship"],
        description: Some("Strong reasoning and coding."),
    },
];

/// 全部已知模型（注册顺序）
pub fn list_models() -> &'static [Model] {
    MODELS
}

pub fn find_model(id: &str) -> Option<&'static Model> {
    MODELS.iter().find(|m| m.id == id)
}

pub fn models_by_provider(provider: ProviderId) -> Vec<&'static Model> {
    MODELS.iter().filter(|m| m.provider == provider).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<_> = list_models().iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), list_models().len());
    }

    #[test]
    fn test_find_and_filter() {
        let m = find_model("deepseek-reasoner").unwrap();
        assert_eq!(m.provider, ProviderId::DeepSeek);
        assert!(m.supports(Reasoning));
        assert!(find_model("no-such-model").is_none());

        let google = models_by_provider(ProviderId::Google);
        assert_eq!(google.len(), 3);
        assert!(google.iter().all(|m| m.provider == ProviderId::Google));
        assert!(models_by_provider(ProviderId::Meta).is_empty());
    }

    #[test]
    fn test_missing_capabilities_keeps_request_order() {
        let m = find_model("gpt-5.2-codex").unwrap();
        assert_eq!(m.missing(&[Vision, ToolCalling, Reasoning]), vec![Vision, Reasoning]);
        assert!(m.supports_all(&[ToolCalling, Streaming]));
    }

    #[test]
    fn test_cost_per_million() {
        let m = find_model("gpt-5.2").unwrap();
        let cost = m.cost(1_000_000, 500_000);
        assert!((cost - (1.75 + 7.0)).abs() < 1e-9);
    }

    #[test]
    fn test_provider_serde_names() {
        assert_eq!(serde_json::to_string(&ProviderId::Glm).unwrap(), "\"glm\"");
        assert_eq!(serde_json::to_string(&ProviderId::NanoBanana).unwrap(), "\"nanobanana\"");
        assert_eq!(serde_json::to_string(&Capability::ToolCalling).unwrap(), "\"toolCalling\"");
        for p in ProviderId::ALL {
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.as_str()));
        }
    }
}
