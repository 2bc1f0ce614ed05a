//! web_search：通过路由器向模型请求带来源的检索摘要

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{Capability, ChatProvider, ChatRequest};
use crate::memory::Message;
use crate::tools::schema::{parameters_schema, parse_args, WebSearchArgs};
use crate::tools::Tool;

pub struct WebSearchTool {
    provider: Arc<dyn ChatProvider>,
    model: String,
    capabilities: Vec<Capability>,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn ChatProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            capabilities: Vec::new(),
        }
    }

    /// 要求实时检索能力（路由器会替换为支持 realTimeSearch 的模型）
    pub fn require_real_time(mut self, on: bool) -> Self {
        self.capabilities = if on { vec![Capability::RealTimeSearch] } else { Vec::new() };
        self
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for real-time information, news, and documentation."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<WebSearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: WebSearchArgs = parse_args(self.name(), args)?;
        let request = ChatRequest::new(
            self.model.clone(),
            vec![Message::user(format!(
                "Search query: {}. Summarize the top findings with sources.",
                args.query
            ))],
        )
        .with_capabilities(self.capabilities.clone());

        match self.provider.chat(&request).await {
            Ok(resp) if resp.text.trim().is_empty() => Ok("No results found.".to_string()),
            Ok(resp) => Ok(resp.text),
            Err(e) => Err(format!("Search failed: {e}")),
        }
    }
}
