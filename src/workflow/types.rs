//! 执行计划类型定义
//!
//! 一个计划是按数组顺序排列的步骤列表，每步归属一个 Agent，并以依赖步骤全部完成为前提。

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type StepId = String;

/// 步骤状态；completed / failed 为终态，不会回到 pending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub id: StepId,
    pub agent_id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub result: Option<String>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            result: None,
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }
}

/// 规划阶段的结构性错误；任何一种都会在执行前中止整个运行
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Plan is not valid JSON: {0}")]
    Parse(String),
    #[error("Plan contains no steps")]
    Empty,
    #[error("Duplicate step id: {0}")]
    DuplicateId(StepId),
    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: StepId, dependency: StepId },
    #[error("Cyclic dependency detected among steps: {}", .0.join(", "))]
    Cycle(Vec<StepId>),
}
