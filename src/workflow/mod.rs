//! 执行计划：步骤类型、依赖图校验、状态迁移与规划响应解析

pub mod graph;
pub mod parser;
pub mod plan;
pub mod types;

pub use graph::PlanGraph;
pub use parser::{parse_plan, strip_code_fences};
pub use plan::{ExecutionPlan, PlanView};
pub use types::{PlanError, PlanStep, StepId, StepStatus};
