//! 规划响应解析
//!
//! 模型应返回 `[{id, agentId, description, dependencies}]`；解析前去掉 ``` / ```json 围栏。
//! 若去掉围栏后仍有前后说明文字，退而截取第一个 `[` 到最后一个 `]` 之间的内容。

use serde::Deserialize;

use crate::workflow::plan::ExecutionPlan;
use crate::workflow::types::{PlanError, PlanStep, StepStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    id: serde_json::Value,
    agent_id: String,
    description: String,
    #[serde(default)]
    dependencies: Vec<serde_json::Value>,
}

/// 去掉 markdown 代码围栏
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// id 允许是数字（部分模型会输出 1, 2, 3）
fn id_string(v: &serde_json::Value) -> Result<String, PlanError> {
    match v {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(PlanError::Parse(format!("invalid step id: {other}"))),
    }
}

fn parse_steps(text: &str) -> Result<Vec<RawStep>, serde_json::Error> {
    serde_json::from_str(text)
}

/// 解析模型输出为已校验的计划
pub fn parse_plan(raw: &str) -> Result<ExecutionPlan, PlanError> {
    let text = strip_code_fences(raw);
    let raw_steps = match parse_steps(&text) {
        Ok(steps) => steps,
        Err(first_err) => {
            let sliced = match (text.find('['), text.rfind(']')) {
                (Some(start), Some(end)) if start < end => &text[start..=end],
                _ => return Err(PlanError::Parse(first_err.to_string())),
            };
            parse_steps(sliced).map_err(|_| PlanError::Parse(first_err.to_string()))?
        }
    };

    let steps = raw_steps
        .into_iter()
        .map(|r| -> Result<PlanStep, PlanError> {
            Ok(PlanStep {
                id: id_string(&r.id)?,
                agent_id: r.agent_id,
                description: r.description,
                dependencies: r.dependencies.iter().map(id_string).collect::<Result<Vec<_>, _>>()?,
                status: StepStatus::Pending,
                result: None,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    ExecutionPlan::new(steps)
}
