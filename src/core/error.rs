//! 运行级错误
//!
//! 步骤内的失败不会走到这里：它们只把该步骤（及其下游）标记为 failed。
//! OrchestratorError 只表示整次运行层面的失败：计划不可用、规划调用失败、汇总失败、会话存储失败。

use thiserror::Error;

use crate::llm::LlmError;
use crate::workflow::PlanError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Plan malformed: {0}")]
    PlanMalformed(#[from] PlanError),

    #[error("Planning failed: {0}")]
    Planning(LlmError),

    /// 汇总失败：运行仍会结束（loading 清除）
    #[error("Final synthesis failed: {0}")]
    Synthesis(LlmError),

    #[error("Session store error: {0}")]
    Store(#[from] anyhow::Error),
}
