//! 多 Provider 路由器
//!
//! 对外只有 chat / reload_config / get_model：
//! 1. 首次使用时为每个已启用 Provider 惰性构造一个适配器（loaded 标志 + 写锁内二次检查）
//! 2. 按 id 解析模型；缺少必需能力时在注册表中找替代（同 Provider 优先，其次已启用 Provider，最后任意）
//! 3. 找不到适配器时重新初始化一次
//! 4. 调用失败：认证错误直接返回可操作的提示；否则尝试一次回退模型（不同且已启用的 Provider）
//!
//! 每次成功调用按注册表价格累计费用，超过 cost_warning_threshold 时告警一次。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::{AiConfigSource, AiSection, ResolvedProvider};
use crate::llm::providers::build_provider;
use crate::llm::registry::{find_model, list_models, Capability, Model, ProviderId};
use crate::llm::traits::{ChatProvider, LlmError};
use crate::llm::types::{ChatRequest, ChatResponse, Usage};

/// 适配器工厂：测试中可替换为返回脚本化后端的闭包
pub type ProviderFactory =
    Arc<dyn Fn(&ResolvedProvider, &AiSection) -> Option<Arc<dyn ChatProvider>> + Send + Sync>;

#[derive(Default)]
struct RouterState {
    loaded: bool,
    config: AiSection,
    providers: HashMap<ProviderId, Arc<dyn ChatProvider>>,
}

/// 单个 Provider 的累计用量
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

/// 全部 Provider 的用量与费用
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageReport {
    pub by_provider: BTreeMap<ProviderId, ProviderUsage>,
    pub total_cost_usd: f64,
    pub threshold_exceeded: bool,
}

impl UsageReport {
    pub fn total_tokens(&self) -> u64 {
        self.by_provider.values().map(|u| u.total_tokens).sum()
    }

    pub fn total_requests(&self) -> u64 {
        self.by_provider.values().map(|u| u.requests).sum()
    }

    /// 记录一次调用；首次越过阈值时返回 true
    fn record(&mut self, model: &Model, usage: Option<Usage>, threshold: f64) -> bool {
        let usage = usage.unwrap_or_default();
        let cost = model.cost(usage.input_tokens, usage.output_tokens);
        let entry = self.by_provider.entry(model.provider).or_default();
        entry.requests += 1;
        entry.input_tokens += usage.input_tokens;
        entry.output_tokens += usage.output_tokens;
        entry.total_tokens += usage.total_tokens.max(usage.input_tokens + usage.output_tokens);
        entry.cost_usd += cost;
        self.total_cost_usd += cost;

        if !self.threshold_exceeded && threshold > 0.0 && self.total_cost_usd >= threshold {
            self.threshold_exceeded = true;
            return true;
        }
        false
    }
}

/// 在注册表中为缺少能力的模型寻找替代：同 Provider > 已启用 Provider > 任意 Provider（注册顺序）
pub fn find_replacement(
    model: &Model,
    required: &[Capability],
    enabled: &HashSet<ProviderId>,
) -> Option<&'static Model> {
    let candidates = || list_models().iter().filter(|m| m.supports_all(required));
    candidates()
        .find(|m| m.provider == model.provider)
        .or_else(|| candidates().find(|m| enabled.contains(&m.provider)))
        .or_else(|| candidates().next())
}

pub struct AiRouter {
    source: Arc<dyn AiConfigSource>,
    factory: ProviderFactory,
    state: RwLock<RouterState>,
    usage: Mutex<UsageReport>,
}

impl AiRouter {
    pub fn new(source: Arc<dyn AiConfigSource>) -> Self {
        Self::with_factory(source, Arc::new(build_provider))
    }

    pub fn with_factory(source: Arc<dyn AiConfigSource>, factory: ProviderFactory) -> Self {
        Self {
            source,
            factory,
            state: RwLock::new(RouterState::default()),
            usage: Mutex::new(UsageReport::default()),
        }
    }

    pub fn get_model(&self, id: &str) -> Option<&'static Model> {
        find_model(id)
    }

    /// 重新读取配置并重建全部适配器；读取失败时保留旧表
    pub async fn reload_config(&self) -> Result<(), config::ConfigError> {
        let ai = self.source.load_ai()?;
        let mut state = self.state.write().await;
        self.rebuild(&mut state, ai);
        Ok(())
    }

    /// 已初始化适配器的 Provider 列表
    pub async fn active_providers(&self) -> Vec<ProviderId> {
        self.ensure_loaded().await;
        let state = self.state.read().await;
        let mut ids: Vec<_> = state.providers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn usage_report(&self) -> UsageReport {
        self.usage.lock().map(|u| u.clone()).unwrap_or_default()
    }

    fn rebuild(&self, state: &mut RouterState, ai: AiSection) {
        let mut providers = HashMap::new();
        for resolved in ai.enabled_providers() {
            if let Some(p) = (self.factory)(&resolved, &ai) {
                providers.insert(resolved.id, p);
            }
        }
        tracing::info!(providers = providers.len(), "router providers initialized");
        state.providers = providers;
        state.config = ai;
        state.loaded = true;
    }

    /// 强制重新初始化；配置读取失败时沿用当前配置重建
    async fn initialize(&self) {
        let loaded = self.source.load_ai();
        let mut state = self.state.write().await;
        let ai = match loaded {
            Ok(ai) => ai,
            Err(e) => {
                tracing::error!(error = %e, "failed to load AI config, keeping current settings");
                state.config.clone()
            }
        };
        self.rebuild(&mut state, ai);
    }

    async fn ensure_loaded(&self) {
        if self.state.read().await.loaded {
            return;
        }
        let mut state = self.state.write().await;
        // 其他调用方可能已在等待写锁期间完成初始化
        if state.loaded {
            return;
        }
        let ai = self.source.load_ai().unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to load AI config, using defaults");
            AiSection::default()
        });
        self.rebuild(&mut state, ai);
    }

    /// 解析目标模型并在必要时做能力替换
    async fn resolve(&self, request: &ChatRequest) -> Result<&'static Model, LlmError> {
        let model = find_model(&request.model).ok_or_else(|| LlmError::ModelNotFound(request.model.clone()))?;
        let missing = model.missing(&request.capabilities);
        if missing.is_empty() {
            return Ok(model);
        }

        tracing::warn!(
            model = model.name,
            missing = ?missing,
            "model missing required capabilities, searching for alternative"
        );
        let enabled: HashSet<ProviderId> = self.state.read().await.providers.keys().copied().collect();
        match find_replacement(model, &request.capabilities, &enabled) {
            Some(replacement) => {
                tracing::info!(from = model.id, to = replacement.id, "auto-switched model");
                Ok(replacement)
            }
            None => Err(LlmError::CapabilityUnsatisfied {
                model: model.id.to_string(),
                missing,
            }),
        }
    }

    async fn adapter_for(&self, provider: ProviderId) -> Option<Arc<dyn ChatProvider>> {
        self.state.read().await.providers.get(&provider).cloned()
    }

    async fn dispatch(
        &self,
        adapter: &Arc<dyn ChatProvider>,
        request: &ChatRequest,
        model: &'static Model,
        ai: &AiSection,
    ) -> Result<ChatResponse, LlmError> {
        let secs = ai.request_timeout().as_secs();
        let resp = tokio::time::timeout(ai.request_timeout(), adapter.chat(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: model.provider,
                secs,
            })??;
        self.record_usage(model, resp.usage, ai.preferences.cost_warning_threshold);
        Ok(resp)
    }

    fn record_usage(&self, model: &Model, usage: Option<Usage>, threshold: f64) {
        let Ok(mut report) = self.usage.lock() else {
            return;
        };
        if report.record(model, usage, threshold) {
            tracing::warn!(
                total_cost_usd = report.total_cost_usd,
                threshold,
                "accumulated model cost exceeded warning threshold"
            );
        }
    }

    async fn execute(
        &self,
        adapter: Arc<dyn ChatProvider>,
        request: ChatRequest,
        model: &'static Model,
    ) -> Result<ChatResponse, LlmError> {
        let ai = self.state.read().await.config.clone();
        let err = match self.dispatch(&adapter, &request, model, &ai).await {
            Ok(resp) => return Ok(resp),
            Err(e) => e,
        };
        tracing::error!(provider = %model.provider, model = model.id, error = %err, "provider failed");

        if err.is_auth() {
            return Err(LlmError::AuthenticationFailed {
                model: model.name.to_string(),
            });
        }

        let Some(fallback) = find_model(&ai.defaults.fallback_model) else {
            return Err(err);
        };
        if fallback.id == model.id || fallback.provider == model.provider {
            return Err(err);
        }
        let Some(fallback_adapter) = self.adapter_for(fallback.provider).await else {
            return Err(err);
        };

        tracing::warn!(fallback = fallback.id, "attempting fallback model");
        match self
            .dispatch(&fallback_adapter, &request.for_model(fallback.id), fallback, &ai)
            .await
        {
            Ok(resp) => Ok(resp),
            Err(fallback_err) => {
                tracing::error!(fallback = fallback.id, error = %fallback_err, "fallback failed");
                Err(err)
            }
        }
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.ensure_loaded().await;

        let model = self.resolve(request).await?;
        let request = if model.id == request.model {
            request.clone()
        } else {
            request.for_model(model.id)
        };

        let adapter = match self.adapter_for(model.provider).await {
            Some(a) => a,
            None => {
                // 最后一次机会：配置可能刚被修改
                self.initialize().await;
                self.adapter_for(model.provider)
                    .await
                    .ok_or(LlmError::ProviderNotConfigured(model.provider))?
            }
        };

        self.execute(adapter, request, model).await
    }
}

#[async_trait]
impl ChatProvider for AiRouter {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        AiRouter::chat(self, request).await
    }
}
