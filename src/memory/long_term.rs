//! 长期记忆：为规划提供检索上下文，并记录用户目标与已完成步骤
//!
//! 检索打分属于外部协作者；当前 InMemoryLongTerm 按关键词重叠 + 层级权重排序，
//! 后续可替换为真实向量库。

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// 记忆层级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryTier {
    ShortTerm,
    Episodic,
    Semantic,
    Procedural,
}

impl MemoryTier {
    pub fn label(&self) -> &'static str {
        match self {
            MemoryTier::ShortTerm => "SHORT-TERM",
            MemoryTier::Episodic => "EPISODIC",
            MemoryTier::Semantic => "SEMANTIC",
            MemoryTier::Procedural => "PROCEDURAL",
        }
    }

    /// 事实与操作步骤在检索时略占优势
    fn weight(&self) -> f64 {
        match self {
            MemoryTier::Semantic => 1.1,
            MemoryTier::Procedural => 1.2,
            _ => 1.0,
        }
    }
}

/// 长期记忆 trait：写入与按查询取上下文
pub trait LongTermMemory: Send + Sync {
    /// 存入一段文本
    fn add(&self, text: &str, tier: MemoryTier, tags: &[String]);

    /// 返回最相关的 limit 条，格式为每行 `[TIER] content`
    fn context(&self, query: &str, limit: usize) -> String;
}

/// 空实现：未启用长期记忆时使用
#[derive(Clone, Default)]
pub struct NoopLongTerm;

impl LongTermMemory for NoopLongTerm {
    fn add(&self, _text: &str, _tier: MemoryTier, _tags: &[String]) {}

    fn context(&self, _query: &str, _limit: usize) -> String {
        String::new()
    }
}

#[derive(Clone, Debug)]
struct Entry {
    text: String,
    tier: MemoryTier,
    tags: Vec<String>,
    tokens: HashSet<String>,
}

/// 简单内存实现：关键词重叠打分（无真实向量）
#[derive(Clone)]
pub struct InMemoryLongTerm {
    store: Arc<RwLock<Vec<Entry>>>,
    max_entries: usize,
}

/// 切分为小写词集合；短于 4 个字符的词不参与匹配
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 3)
        .collect()
}

impl InMemoryLongTerm {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(Vec::new())),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按标签筛选条目文本（调试与测试用）
    pub fn with_tag(&self, tag: &str) -> Vec<String> {
        self.store
            .read()
            .map(|s| {
                s.iter()
                    .filter(|e| e.tags.iter().any(|t| t == tag))
                    .map(|e| e.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for InMemoryLongTerm {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl LongTermMemory for InMemoryLongTerm {
    fn add(&self, text: &str, tier: MemoryTier, tags: &[String]) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let Ok(mut store) = self.store.write() else {
            return;
        };
        store.push(Entry {
            text: text.to_string(),
            tier,
            tags: tags.to_vec(),
            tokens: tokenize_lower(text),
        });
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
    }

    fn context(&self, query: &str, limit: usize) -> String {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return String::new();
        }
        let Ok(store) = self.store.read() else {
            return String::new();
        };
        let mut scored: Vec<(f64, usize, &Entry)> = store
            .iter()
            .enumerate()
            .map(|(idx, e)| {
                let overlap = query_tokens.intersection(&e.tokens).count() as f64;
                (overlap * 0.2 * e.tier.weight(), idx, e)
            })
            .filter(|(s, _, _)| *s > 0.0)
            .collect();
        // 同分时越新越靠前
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, _, e)| format!("[{}] {}", e.tier.label(), e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
