//! Nexus - Rust 多智能体编排系统
//!
//! 模块划分：
//! - **agent**: Agent 角色、状态与默认阵容（角色 -> 能力 / 工具 / 模型类别）
//! - **config**: 应用配置加载（TOML + NEXUS__* 环境变量）
//! - **core**: 重试包装、运行错误、状态投影、编排器
//! - **llm**: 模型注册表、规范请求 / 响应、各家上游适配器与路由器
//! - **memory**: 工作记忆、长期记忆、会话消息存储
//! - **observability**: tracing 初始化
//! - **tools**: 工具 trait、注册表、执行器，web_search 与 code_analysis
//! - **workflow**: 执行计划（依赖图校验、就绪判定、失败级联、规划解析）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
pub mod workflow;

pub use crate::core::{Orchestrator, OrchestratorBuilder, OrchestratorError};
pub use crate::llm::AiRouter;
