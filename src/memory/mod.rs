//! 记忆层：规范消息、工作记忆（单次运行）、长期记忆（检索上下文）、会话消息存储

pub mod conversation;
pub mod long_term;
pub mod session;
pub mod working;

pub use conversation::{Message, Role};
pub use long_term::{InMemoryLongTerm, LongTermMemory, MemoryTier, NoopLongTerm};
pub use session::{
    ChatSession, InMemoryMessageStore, MessageKind, MessageRole, MessageStore, SessionMessage,
    ToolCallRecord, ToolCallStatus,
};
pub use working::{Hypothesis, SharedWorkingMemory, WorkingMemory, WorkingMemorySnapshot};
