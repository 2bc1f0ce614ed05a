//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NEXUS__*` 覆盖（双下划线表示嵌套，如
//! `NEXUS__AI__PROVIDERS__OPENAI__API_KEY=sk-...`）。未写 api_key 的 Provider 再回退到
//! 各自约定的环境变量（OPENAI_API_KEY 等）。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::resilience::RetryConfig;
use crate::llm::registry::ProviderId;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub ai: AiSection,
    pub orchestrator: OrchestratorSection,
    pub tools: ToolsSection,
}

/// [ai] 段：Provider 表、各类任务默认模型、偏好、超时与重试
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AiSection {
    pub providers: BTreeMap<ProviderId, ProviderEntry>,
    pub defaults: ModelDefaults,
    pub preferences: Preferences,
    pub timeouts: AiTimeouts,
    pub retry: RetryConfig,
}

/// [ai.providers.<id>] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderEntry {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// 未设置时：有 API Key 即启用
    pub enabled: Option<bool>,
}

/// 合并配置、环境变量与内置默认值后的单个 Provider 设置
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProvider {
    pub id: ProviderId,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub enabled: bool,
}

impl AiSection {
    /// 解析某个 Provider 的最终设置
    pub fn provider(&self, id: ProviderId) -> ResolvedProvider {
        let entry = self.providers.get(&id).cloned().unwrap_or_default();
        let api_key = entry
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                id.api_key_env_vars()
                    .iter()
                    .find_map(|name| std::env::var(name).ok().filter(|k| !k.trim().is_empty()))
            });
        let base_url = entry
            .base_url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| id.default_base_url().map(String::from))
            .map(|u| u.trim_end_matches('/').to_string());
        let enabled = entry.enabled.unwrap_or(api_key.is_some());
        ResolvedProvider {
            id,
            api_key,
            base_url,
            enabled,
        }
    }

    /// 全部已启用的 Provider
    pub fn enabled_providers(&self) -> Vec<ResolvedProvider> {
        ProviderId::ALL
            .iter()
            .map(|id| self.provider(*id))
            .filter(|p| p.enabled)
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.probe_secs.max(1))
    }
}

/// [ai.defaults] 段：按任务类别的默认模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelDefaults {
    pub general_model: String,
    pub coding_model: String,
    pub vision_model: String,
    pub reasoning_model: String,
    pub long_context_model: String,
    /// 主模型失败后的低成本回退模型
    pub fallback_model: String,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            general_model: "gemini-3-flash-preview".into(),
            coding_model: "claude-opus-4-5-20251101".into(),
            vision_model: "gpt-5.2".into(),
            reasoning_model: "deepseek-reasoner".into(),
            long_context_model: "gemini-3-flash-preview".into(),
            fallback_model: "gemini-3-flash-preview".into(),
        }
    }
}

/// 任务类别（用于选择默认模型）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    General,
    Coding,
    Vision,
    Reasoning,
    LongContext,
}

impl ModelDefaults {
    pub fn for_category(&self, category: TaskCategory) -> &str {
        match category {
            TaskCategory::General => &self.general_model,
            TaskCategory::Coding => &self.coding_model,
            TaskCategory::Vision => &self.vision_model,
            TaskCategory::Reasoning => &self.reasoning_model,
            TaskCategory::LongContext => &self.long_context_model,
        }
    }
}

/// [ai.preferences] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub use_reasoning: bool,
    pub use_thinking_in_tools: bool,
    pub use_real_time_search: bool,
    pub stream_responses: bool,
    /// 关闭后所有 Agent 使用同一个模型（orchestrator.selected_model 或 general_model）
    pub auto_switch_models: bool,
    /// 累计费用告警阈值（USD）
    pub cost_warning_threshold: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            use_reasoning: true,
            use_thinking_in_tools: true,
            use_real_time_search: true,
            stream_responses: true,
            auto_switch_models: true,
            cost_warning_threshold: 5.0,
        }
    }
}

/// [ai.timeouts] 段（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiTimeouts {
    /// 单次上游调用（含重试）的截止时间
    pub request_secs: u64,
    /// 本地服务探活
    pub probe_secs: u64,
}

impl Default for AiTimeouts {
    fn default() -> Self {
        Self {
            request_secs: 60,
            probe_secs: 2,
        }
    }
}

/// [orchestrator] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub tick_interval_ms: u64,
    /// 规划时检索的长期记忆条数
    pub memory_context_limit: usize,
    /// 设置后所有 Agent 与规划都使用该模型
    pub selected_model: Option<String>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            memory_context_limit: 5,
            selected_model: None,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 NEXUS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NEXUS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NEXUS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置；路由器在 reload_config 时经由 AiConfigSource 调用
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

/// 路由器读取 [ai] 段的来源（设置界面等外部协作者可自行实现）
pub trait AiConfigSource: Send + Sync {
    fn load_ai(&self) -> Result<AiSection, config::ConfigError>;
}

/// 固定配置（测试与嵌入式使用）
#[derive(Debug, Clone, Default)]
pub struct StaticAiConfig(pub AiSection);

impl AiConfigSource for StaticAiConfig {
    fn load_ai(&self) -> Result<AiSection, config::ConfigError> {
        Ok(self.0.clone())
    }
}

/// 每次从磁盘 + 环境变量重新读取
#[derive(Debug, Clone, Default)]
pub struct FileAiConfig {
    pub path: Option<PathBuf>,
}

impl AiConfigSource for FileAiConfig {
    fn load_ai(&self) -> Result<AiSection, config::ConfigError> {
        load_config(self.path.clone()).map(|c| c.ai)
    }
}
