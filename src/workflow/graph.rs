//! 计划依赖图
//!
//! 使用邻接表和入度表描述 DAG：构造时校验重复 id、未知依赖与环（Kahn 拓扑排序），
//! 运行期提供就绪判断与失败传播所需的下游闭包。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::workflow::types::{PlanError, PlanStep, StepId, StepStatus};

/// 计划依赖图
#[derive(Debug, Clone, Default)]
pub struct PlanGraph {
    /// 邻接表：步骤 ID -> 依赖该步骤的步骤列表
    pub adjacency: HashMap<StepId, Vec<StepId>>,
    /// 入度表：步骤 ID -> 依赖数（去重后）
    pub in_degree: HashMap<StepId, usize>,
}

impl PlanGraph {
    /// 构建并校验依赖图
    pub fn build(steps: &[PlanStep]) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut adjacency: HashMap<StepId, Vec<StepId>> = HashMap::new();
        let mut in_degree: HashMap<StepId, usize> = HashMap::new();
        for step in steps {
            if in_degree.insert(step.id.clone(), 0).is_some() {
                return Err(PlanError::DuplicateId(step.id.clone()));
            }
            adjacency.insert(step.id.clone(), Vec::new());
        }

        for step in steps {
            let mut seen = HashSet::new();
            for dep in &step.dependencies {
                if !in_degree.contains_key(dep) {
                    return Err(PlanError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                if !seen.insert(dep) {
                    continue;
                }
                adjacency.entry(dep.clone()).or_default().push(step.id.clone());
                *in_degree.entry(step.id.clone()).or_insert(0) += 1;
            }
        }

        let graph = Self { adjacency, in_degree };
        graph.check_acyclic(steps)?;
        Ok(graph)
    }

    /// Kahn 算法：无法排出的步骤即在环上（或依赖环上的步骤）
    fn check_acyclic(&self, steps: &[PlanStep]) -> Result<(), PlanError> {
        let mut degree = self.in_degree.clone();
        let mut queue: VecDeque<&StepId> = steps
            .iter()
            .map(|s| &s.id)
            .filter(|id| degree.get(*id) == Some(&0))
            .collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop_front() {
            visited += 1;
            for next in self.adjacency.get(id).into_iter().flatten() {
                if let Some(d) = degree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if visited == steps.len() {
            return Ok(());
        }
        let stuck: Vec<StepId> = steps
            .iter()
            .filter(|s| degree.get(&s.id).copied().unwrap_or(0) > 0)
            .map(|s| s.id.clone())
            .collect();
        Err(PlanError::Cycle(stuck))
    }

    /// 某步骤的全部下游（传递闭包，按 BFS 顺序，不含自身）
    pub fn dependents_of(&self, id: &str) -> Vec<StepId> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(cur) = queue.pop_front() {
            for next in self.adjacency.get(cur).into_iter().flatten() {
                if seen.insert(next.as_str()) {
                    out.push(next.clone());
                    queue.push_back(next.as_str());
                }
            }
        }
        out
    }
}

/// 步骤是否就绪：自身 pending 且每个依赖都已 completed
pub fn is_ready(step: &PlanStep, status_of: impl Fn(&str) -> Option<StepStatus>) -> bool {
    step.status == StepStatus::Pending
        && step
            .dependencies
            .iter()
            .all(|d| status_of(d) == Some(StepStatus::Completed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> PlanStep {
        PlanStep::new(id, "coder", format!("Task {id}")).depends_on(deps)
    }

    #[test]
    fn test_graph_construction() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["a", "b"])];
        let graph = PlanGraph::build(&steps).unwrap();
        assert_eq!(graph.in_degree.get("a"), Some(&0));
        assert_eq!(graph.in_degree.get("c"), Some(&2));
        assert_eq!(graph.adjacency["a"], vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_two_node_cycle_rejected() {
        let steps = vec![step("x", &["y"]), step("y", &["x"])];
        match PlanGraph::build(&steps) {
            Err(PlanError::Cycle(ids)) => assert_eq!(ids, vec!["x".to_string(), "y".to_string()]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let steps = vec![step("a", &[]), step("b", &["b"])];
        assert!(matches!(PlanGraph::build(&steps), Err(PlanError::Cycle(_))));
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(PlanGraph::build(&[]).unwrap_err(), PlanError::Empty);
        assert_eq!(
            PlanGraph::build(&[step("a", &[]), step("a", &[])]).unwrap_err(),
            PlanError::DuplicateId("a".into())
        );
        assert_eq!(
            PlanGraph::build(&[step("a", &["ghost"])]).unwrap_err(),
            PlanError::UnknownDependency {
                step: "a".into(),
                dependency: "ghost".into()
            }
        );
    }

    #[test]
    fn test_forward_reference_allowed() {
        let steps = vec![step("b", &["a"]), step("a", &[])];
        assert!(PlanGraph::build(&steps).is_ok());
    }

    #[test]
    fn test_dependents_transitive() {
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["b"]),
            step("d", &[]),
        ];
        let graph = PlanGraph::build(&steps).unwrap();
        assert_eq!(graph.dependents_of("a"), vec!["b".to_string(), "c".to_string()]);
        assert!(graph.dependents_of("d").is_empty());
    }
}
