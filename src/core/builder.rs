//! 编排器构建器：统一的组装逻辑
//!
//! CLI 与测试共用：由配置创建路由器、工具注册表、长期记忆与会话存储，再组装 Orchestrator。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::llm::{ChatProvider, ProviderId};
use crate::memory::{InMemoryLongTerm, InMemoryMessageStore, LongTermMemory, MessageStore};
use crate::tools::{CodeAnalysisTool, ToolExecutor, ToolRegistry, WebSearchTool};

/// 长期记忆默认容量
const LONG_TERM_CAPACITY: usize = 500;

pub struct OrchestratorBuilder {
    config: AppConfig,
    router: Arc<dyn ChatProvider>,
    long_term: Option<Arc<dyn LongTermMemory>>,
    store: Option<Arc<dyn MessageStore>>,
    session_id: Option<String>,
}

impl OrchestratorBuilder {
    /// router 一般为 AiRouter；测试中可换成脚本化后端
    pub fn new(config: AppConfig, router: Arc<dyn ChatProvider>) -> Self {
        Self {
            config,
            router,
            long_term: None,
            store: None,
            session_id: None,
        }
    }

    pub fn with_long_term(mut self, long_term: Arc<dyn LongTermMemory>) -> Self {
        self.long_term = Some(long_term);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// 只有开启实时检索且 Grok 可用时，web_search 才要求 realTimeSearch 能力
    fn real_time_search(&self) -> bool {
        self.config.ai.preferences.use_real_time_search
            && self.config.ai.provider(ProviderId::Grok).enabled
    }

    /// 构建工具注册表（web_search + code_analysis），工具调用同样经过路由器
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let defaults = &self.config.ai.defaults;
        let mut tools = ToolRegistry::new();
        tools.register(
            WebSearchTool::new(self.router.clone(), defaults.general_model.clone())
                .require_real_time(self.real_time_search()),
        );
        tools.register(CodeAnalysisTool::new(self.router.clone(), defaults.coding_model.clone()));
        tools
    }

    pub fn build(self) -> Orchestrator {
        let executor = ToolExecutor::new(self.build_tool_registry(), self.config.tools.tool_timeout_secs);
        let long_term = self
            .long_term
            .unwrap_or_else(|| Arc::new(InMemoryLongTerm::new(LONG_TERM_CAPACITY)));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryMessageStore::new()));
        let orchestrator = Orchestrator::new(
            self.router,
            executor,
            long_term,
            store,
            OrchestratorSettings::from_config(&self.config),
        );
        match self.session_id {
            Some(id) => orchestrator.with_session(id),
            None => orchestrator,
        }
    }
}
