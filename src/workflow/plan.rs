//! 执行计划：步骤列表 + 依赖图 + 状态迁移
//!
//! 状态只能前进：pending -> active -> completed / failed，或 pending -> failed（上游失败时级联）。
//! 非法迁移返回 false 且不改变状态，调用方据此丢弃过期的完成回写。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::workflow::graph::{is_ready, PlanGraph};
use crate::workflow::types::{PlanError, PlanStep, StepId, StepStatus};

#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    steps: Vec<PlanStep>,
    graph: PlanGraph,
}

/// 计划的只读视图（给 UI / CLI 渲染）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanView {
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// 校验并创建计划；所有步骤重置为 pending、清空结果
    pub fn new(mut steps: Vec<PlanStep>) -> Result<Self, PlanError> {
        for s in &mut steps {
            s.status = StepStatus::Pending;
            s.result = None;
        }
        let graph = PlanGraph::build(&steps)?;
        Ok(Self { steps, graph })
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.get(id).map(|s| s.status)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// 按数组顺序第一个就绪的步骤
    pub fn next_ready(&self) -> Option<&PlanStep> {
        self.steps.iter().find(|s| is_ready(s, |id| self.status_of(id)))
    }

    /// pending 且就绪 -> active
    pub fn mark_active(&mut self, id: &str) -> bool {
        let ready = self.get(id).map(|s| is_ready(s, |d| self.status_of(d))).unwrap_or(false);
        if !ready {
            return false;
        }
        if let Some(step) = self.get_mut(id) {
            step.status = StepStatus::Active;
        }
        true
    }

    /// active -> completed，并记录结果
    pub fn mark_completed(&mut self, id: &str, result: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(step) if step.status == StepStatus::Active => {
                step.status = StepStatus::Completed;
                step.result = Some(result.into());
                true
            }
            _ => false,
        }
    }

    /// 非终态 -> failed；返回被级联标记为 failed 的下游步骤
    pub fn mark_failed(&mut self, id: &str, error: impl Into<String>) -> Option<Vec<StepId>> {
        match self.get_mut(id) {
            Some(step) if !step.status.is_terminal() => {
                step.status = StepStatus::Failed;
                step.result = Some(error.into());
            }
            _ => return None,
        }

        let mut skipped = Vec::new();
        for dep_id in self.graph.dependents_of(id) {
            if let Some(step) = self.get_mut(&dep_id) {
                if step.status == StepStatus::Pending {
                    step.status = StepStatus::Failed;
                    step.result = Some(format!("Skipped: dependency {id} failed"));
                    skipped.push(dep_id);
                }
            }
        }
        Some(skipped)
    }

    pub fn all_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    pub fn any_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// 已完成步骤的 id -> 结果（有序，便于稳定序列化）
    pub fn results(&self) -> BTreeMap<StepId, String> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .filter_map(|s| s.result.clone().map(|r| (s.id.clone(), r)))
            .collect()
    }

    pub fn view(&self) -> PlanView {
        PlanView {
            steps: self.steps.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fan_out() -> ExecutionPlan {
        ExecutionPlan::new(vec![
            PlanStep::new("a", "researcher", "gather"),
            PlanStep::new("b", "coder", "build").depends_on(&["a"]),
            PlanStep::new("c", "creative", "design").depends_on(&["a"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_readiness_follows_dependencies() {
        let mut plan = fan_out();
        assert_eq!(plan.next_ready().unwrap().id, "a");
        assert!(!plan.mark_active("b"));

        assert!(plan.mark_active("a"));
        assert!(plan.next_ready().is_none());

        assert!(plan.mark_completed("a", "done"));
        assert_eq!(plan.next_ready().unwrap().id, "b");
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut plan = fan_out();
        plan.mark_active("a");
        plan.mark_completed("a", "ok");
        assert!(!plan.mark_completed("a", "again"));
        assert!(plan.mark_failed("a", "late").is_none());
        assert_eq!(plan.get("a").unwrap().result.as_deref(), Some("ok"));
    }

    #[test]
    fn test_failure_cascades_to_dependents_only() {
        let mut plan = ExecutionPlan::new(vec![
            PlanStep::new("a", "researcher", "x"),
            PlanStep::new("b", "coder", "y").depends_on(&["a"]),
            PlanStep::new("c", "coder", "z").depends_on(&["b"]),
            PlanStep::new("d", "creative", "w"),
        ])
        .unwrap();
        plan.mark_active("a");
        let skipped = plan.mark_failed("a", "boom").unwrap();
        assert_eq!(skipped, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(plan.get("c").unwrap().result.as_deref(), Some("Skipped: dependency a failed"));
        assert_eq!(plan.next_ready().unwrap().id, "d");
        assert!(!plan.all_terminal());
        assert!(plan.any_failed());
    }

    #[test]
    fn test_new_resets_status() {
        let mut step = PlanStep::new("a", "coder", "x");
        step.status = StepStatus::Completed;
        step.result = Some("stale".into());
        let plan = ExecutionPlan::new(vec![step]).unwrap();
        assert_eq!(plan.status_of("a"), Some(StepStatus::Pending));
        assert!(plan.results().is_empty());
    }
}
