//! 工作记忆：单次运行内所有 Agent 共享的草稿板、最近思考与假设列表
//!
//! 编排循环与工具执行持续写入；UI 只通过 snapshot() 读取深拷贝，不持有活引用。
//! 每个新目标开始时 clear()。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;

/// 最近思考的保留条数，超出时淘汰最旧的
pub const MAX_RECENT_THOUGHTS: usize = 10;

/// 一条假设，confidence 始终落在 [0, 1]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Hypothesis {
    pub id: String,
    pub content: String,
    pub confidence: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WorkingMemory {
    pub scratchpad: BTreeMap<String, Value>,
    pub recent_thoughts: Vec<String>,
    pub hypotheses: Vec<Hypothesis>,
}

/// 快照与内部状态同构；单独命名以强调其为只读副本
pub type WorkingMemorySnapshot = WorkingMemory;

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_scratchpad(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.scratchpad.insert(key.into(), value.into());
    }

    pub fn push_thought(&mut self, thought: impl Into<String>) {
        self.recent_thoughts.push(thought.into());
        if self.recent_thoughts.len() > MAX_RECENT_THOUGHTS {
            let overflow = self.recent_thoughts.len() - MAX_RECENT_THOUGHTS;
            self.recent_thoughts.drain(..overflow);
        }
    }

    /// 添加假设，返回其 id
    pub fn add_hypothesis(&mut self, content: impl Into<String>, confidence: f64) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self.hypotheses.push(Hypothesis {
            id: id.clone(),
            content: content.into(),
            confidence,
        });
        id
    }

    pub fn clear(&mut self) {
        self.scratchpad.clear();
        self.recent_thoughts.clear();
        self.hypotheses.clear();
    }

    /// 草稿板序列化为 JSON 字符串，拼入任务上下文
    pub fn scratchpad_json(&self) -> String {
        serde_json::to_string(&self.scratchpad).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 可跨任务共享的工作记忆句柄（Arc + Mutex，单次加锁内完成读写，避免撕裂）
#[derive(Clone, Debug, Default)]
pub struct SharedWorkingMemory {
    inner: Arc<Mutex<WorkingMemory>>,
}

impl SharedWorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WorkingMemory> {
        // 写入方 panic 不应让其余读者永久失效
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn update_scratchpad(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.lock().update_scratchpad(key, value);
    }

    pub fn push_thought(&self, thought: impl Into<String>) {
        self.lock().push_thought(thought);
    }

    pub fn add_hypothesis(&self, content: impl Into<String>, confidence: f64) -> String {
        self.lock().add_hypothesis(content, confidence)
    }

    pub fn snapshot(&self) -> WorkingMemorySnapshot {
        self.lock().clone()
    }

    pub fn scratchpad_json(&self) -> String {
        self.lock().scratchpad_json()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
