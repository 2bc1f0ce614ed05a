//! 会话消息存储（外部协作者接口）
//!
//! 编排器只通过 MessageStore 追加 / 读取消息，不定义存储格式；
//! InMemoryMessageStore 供 CLI 与测试使用。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 新会话的默认标题，首条用户消息会替换它
pub const DEFAULT_SESSION_TITLE: &str = "New Session";

/// 会话中消息的发送方
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
    System,
}

/// 消息类别（UI 渲染用）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Plan,
    Result,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Success,
    Error,
}

/// 消息内展示的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
    pub status: ToolCallStatus,
    pub result: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    /// 毫秒时间戳
    pub timestamp: i64,
    pub thinking: Option<String>,
    pub agent_id: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub kind: MessageKind,
}

impl SessionMessage {
    pub fn new(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            thinking: None,
            agent_id: None,
            tool_calls: Vec::new(),
            kind: MessageKind::Text,
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_thinking(mut self, thinking: Option<String>) -> Self {
        self.thinking = thinking;
        self
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = calls;
        self
    }
}

/// 会话索引条目
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub last_modified: i64,
    pub preview: String,
}

impl ChatSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            last_modified: chrono::Utc::now().timestamp_millis(),
            preview: "New Conversation".to_string(),
        }
    }

    /// 新消息到达时刷新预览、修改时间，并在仍为默认标题时用首条用户消息命名
    pub fn touch(&mut self, msg: &SessionMessage) {
        self.last_modified = msg.timestamp;
        self.preview = truncate_with_ellipsis(&msg.content, 60);
        if self.title == DEFAULT_SESSION_TITLE && msg.role == MessageRole::User {
            self.title = truncate_with_ellipsis(&msg.content, 30);
        }
    }
}

/// 按字符截断，超出时追加 "..."
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 会话 / 消息存储接口
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn get_messages(&self, session_id: &str) -> anyhow::Result<Vec<SessionMessage>>;

    async fn save_messages(&self, session_id: &str, messages: &[SessionMessage]) -> anyhow::Result<()>;

    /// 按 last_modified 倒序
    async fn get_sessions(&self) -> anyhow::Result<Vec<ChatSession>>;

    async fn save_sessions(&self, sessions: &[ChatSession]) -> anyhow::Result<()>;
}

/// 进程内存储
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<String, Vec<SessionMessage>>>,
    sessions: RwLock<Vec<ChatSession>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn get_messages(&self, session_id: &str) -> anyhow::Result<Vec<SessionMessage>> {
        Ok(self
            .messages
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_messages(&self, session_id: &str, messages: &[SessionMessage]) -> anyhow::Result<()> {
        self.messages
            .write()
            .await
            .insert(session_id.to_string(), messages.to_vec());
        Ok(())
    }

    async fn get_sessions(&self) -> anyhow::Result<Vec<ChatSession>> {
        let mut sessions = self.sessions.read().await.clone();
        sessions.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(sessions)
    }

    async fn save_sessions(&self, sessions: &[ChatSession]) -> anyhow::Result<()> {
        *self.sessions.write().await = sessions.to_vec();
        Ok(())
    }
}
