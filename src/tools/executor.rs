//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用工具；
//! 工具失败、超时或不存在时都转为结果文本，单个工具出错不会中断步骤。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::timeout;

use crate::llm::{ToolCall, ToolDeclaration};
use crate::memory::session::truncate_with_ellipsis;
use crate::memory::SharedWorkingMemory;
use crate::tools::ToolRegistry;

/// 未注册工具的结果文本
pub const TOOL_NOT_FOUND: &str = "Tool not found.";

/// 回传给模型的单条工具结果：`{id, name, response: {result}}`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub response: ToolResult,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolResult {
    pub result: String,
}

/// 工具执行器：对每次调用施加超时，失败一律折叠为文本
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具，返回结果文本；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> String {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let (ok, outcome, content) = match self.registry.get(tool_name) {
            None => (false, "not_found", TOOL_NOT_FOUND.to_string()),
            Some(tool) => match timeout(self.timeout, tool.execute(args)).await {
                Ok(Ok(content)) => (true, "ok", content),
                Ok(Err(e)) => (false, "error", e),
                Err(_) => (
                    false,
                    "timeout",
                    format!("Tool {} timed out after {}s", tool_name, self.timeout.as_secs()),
                ),
            },
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        content
    }

    /// 依次执行一批工具调用；每次调用写入思考与草稿板
    pub async fn execute_calls(&self, calls: &[ToolCall], memory: &SharedWorkingMemory) -> Vec<ToolResponse> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            memory.push_thought(format!("Invoking tool: {} with params: {}", call.name, call.args));
            let result = self.execute(&call.name, call.args.clone()).await;
            memory.update_scratchpad(
                format!("tool_result_{}", call.name),
                format!("{}...", result.chars().take(50).collect::<String>()),
            );
            responses.push(ToolResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response: ToolResult { result },
            });
        }
        responses
    }

    pub fn declarations_for<S: AsRef<str>>(&self, names: &[S]) -> Vec<ToolDeclaration> {
        self.registry.declarations_for(names)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    truncate_with_ellipsis(&args.to_string(), 200)
}
