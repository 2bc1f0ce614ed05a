//! 运行状态：阶段、指标与只读快照
//!
//! 编排器内部持有完整状态；外部（CLI / UI）只拿 RunSnapshot 这样的深拷贝投影。

use serde::Serialize;

use crate::agent::Agent;
use crate::llm::Usage;
use crate::memory::WorkingMemorySnapshot;
use crate::workflow::PlanView;

/// 整次运行的阶段：planning -> executing -> synthesizing -> idle，executing 可进入 failed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    #[default]
    Idle,
    Planning,
    Executing,
    Synthesizing,
    Failed,
}

impl RunPhase {
    /// 运行尚未结束
    pub fn in_progress(&self) -> bool {
        matches!(self, RunPhase::Planning | RunPhase::Executing | RunPhase::Synthesizing)
    }
}

/// 运行指标（仪表盘用）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunMetrics {
    pub total_tokens: u64,
    pub requests: u64,
    pub errors: u64,
}

impl RunMetrics {
    pub fn record(&mut self, usage: Option<Usage>) {
        self.requests += 1;
        if let Some(u) = usage {
            self.total_tokens += u.total_tokens;
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSnapshot {
    pub phase: RunPhase,
    /// 每次提交新目标时递增
    pub generation: u64,
    pub loading: bool,
    pub goal: Option<String>,
    pub plan: PlanView,
    pub agents: Vec<Agent>,
    pub memory: WorkingMemorySnapshot,
    pub metrics: RunMetrics,
    pub error: Option<String>,
    pub final_answer: Option<String>,
}

/// 单次 tick 的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// 没有可推进的步骤
    Idle,
    StepCompleted(String),
    StepFailed(String),
    /// 结果属于已被替换的计划，已丢弃
    Stale,
    Synthesized,
    /// 全部终态但存在失败步骤，跳过汇总
    RunFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record() {
        let mut m = RunMetrics::default();
        m.record(Some(Usage::new(10, 5)));
        m.record(None);
        assert_eq!(m.requests, 2);
        assert_eq!(m.total_tokens, 15);
        assert!(RunPhase::Synthesizing.in_progress());
        assert!(!RunPhase::Failed.in_progress());
    }
}
