//! Agent 定义与默认阵容
//!
//! 每个 Agent 有固定角色；角色到「必需能力 / 可用工具 / 默认模型类别」的映射在此显式声明，
//! capabilities 字段只是展示用标签，不参与能力推断。

use serde::{Deserialize, Serialize};

use crate::config::{ModelDefaults, TaskCategory};
use crate::llm::Capability;

/// 运行时无法识别计划中的 agentId 时，退回阵容第一个 Agent
pub const COORDINATOR_ID: &str = "coordinator";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    Orchestrator,
    Engineer,
    Analyst,
    Designer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Orchestrator => "Orchestrator",
            AgentRole::Engineer => "Engineer",
            AgentRole::Analyst => "Analyst",
            AgentRole::Designer => "Designer",
        }
    }

    /// 执行步骤时对模型的必需能力
    pub fn required_capabilities(&self) -> Vec<Capability> {
        match self {
            AgentRole::Engineer | AgentRole::Analyst => vec![Capability::ToolCalling],
            AgentRole::Designer => vec![Capability::Vision],
            AgentRole::Orchestrator => Vec::new(),
        }
    }

    /// 可声明给模型的工具
    pub fn tool_names(&self) -> &'static [&'static str] {
        match self {
            AgentRole::Engineer => &["web_search", "code_analysis"],
            AgentRole::Analyst => &["web_search"],
            AgentRole::Designer | AgentRole::Orchestrator => &[],
        }
    }

    pub fn task_category(&self) -> TaskCategory {
        match self {
            AgentRole::Engineer => TaskCategory::Coding,
            AgentRole::Designer => TaskCategory::Vision,
            AgentRole::Analyst | AgentRole::Orchestrator => TaskCategory::General,
        }
    }

    /// 角色默认模型；selected 非空时所有角色共用该模型
    pub fn model<'a>(&self, defaults: &'a ModelDefaults, selected: Option<&'a str>) -> &'a str {
        selected.unwrap_or_else(|| defaults.for_category(self.task_category()))
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Thinking,
    Executing,
    Dormant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub specialty: String,
    pub system_prompt: String,
    /// 展示用能力标签
    pub capabilities: Vec<String>,
}

impl Agent {
    fn new(
        id: &str,
        name: &str,
        role: AgentRole,
        status: AgentStatus,
        specialty: &str,
        system_prompt: &str,
        capabilities: &[&str],
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role,
            status,
            specialty: specialty.to_string(),
            system_prompt: system_prompt.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// 默认阵容：协调者 + 工程 / 研究 / 设计三个专家
pub fn default_agents() -> Vec<Agent> {
    vec![
        Agent::new(
            COORDINATOR_ID,
            "Orchestrator",
            AgentRole::Orchestrator,
            AgentStatus::Idle,
            "Strategic Planning",
            "You are the Orchestrator, the Strategic Planner.\nRESPONSIBILITIES:\n1. Analyze requests and delegate to specialists.\n2. Synthesize results into a final answer.\n3. Ensure the strategic goal is met.",
            &["Task Decomposition", "Context Synthesis", "Plan Optimization"],
        ),
        Agent::new(
            "coder",
            "DevUnit-7",
            AgentRole::Engineer,
            AgentStatus::Dormant,
            "Full Stack Dev",
            "You are DevUnit-7, a senior software engineer.\nCAPABILITIES:\n- Write clean, production-ready code.\n- Analyze existing code.\n- Design scalable architectures.",
            &["React/TypeScript", "System Design", "Algorithm Optimization"],
        ),
        Agent::new(
            "researcher",
            "Archive-X",
            AgentRole::Analyst,
            AgentStatus::Dormant,
            "Data Synthesis",
            "You are Archive-X, an elite research agent.\nCAPABILITIES:\n- Retrieve real-time info using 'web_search'.\n- Synthesize data and verify facts.",
            &["Deep Web Search", "Trend Analysis", "Fact Verification"],
        ),
        Agent::new(
            "creative",
            "Muse-9",
            AgentRole::Designer,
            AgentStatus::Dormant,
            "UX & Copy",
            "You are Muse-9, a creative director.\nCAPABILITIES:\n- Design intuitive user flows.\n- Write compelling copy.",
            &["User Experience", "Creative Writing", "Brand Strategy"],
        ),
    ]
}
