//! 脚本化后端（用于测试，无需 API）
//!
//! 按顺序弹出预置的响应或错误；队列为空时交给可选的 handler，再没有则回显最后一条用户消息。
//! 所有请求都会被记录，便于断言请求内容与调用次数。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::traits::{ChatProvider, LlmError};
use crate::llm::types::{ChatRequest, ChatResponse};
use crate::memory::Role;

type Handler = Arc<dyn Fn(&ChatRequest) -> Result<ChatResponse, LlmError> + Send + Sync>;

#[derive(Default, Clone)]
pub struct ScriptedProvider {
    queue: Arc<Mutex<VecDeque<Result<ChatResponse, LlmError>>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    handler: Option<Handler>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 队列为空时按请求内容生成响应
    pub fn with_handler(
        handler: impl Fn(&ChatRequest) -> Result<ChatResponse, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, response: ChatResponse) -> &Self {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Ok(response));
        }
        self
    }

    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push_ok(ChatResponse::text(text))
    }

    pub fn push_err(&self, error: LlmError) -> &Self {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Err(error));
        }
        self
    }

    /// 已收到的全部请求（按顺序）
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(request.clone());
        }
        let scripted = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(next) = scripted {
            return next;
        }
        if let Some(handler) = &self.handler {
            return handler(request);
        }
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(ChatResponse::text(format!("Echo from Mock: {last_user}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::registry::ProviderId;
    use crate::memory::Message;

    #[tokio::test]
    async fn test_queue_then_echo() {
        let mock = ScriptedProvider::new();
        mock.push_text("first").push_err(LlmError::ProviderNotConfigured(ProviderId::Meta));
        let req = ChatRequest::new("m", vec![Message::user("hello")]);

        assert_eq!(mock.chat(&req).await.unwrap().text, "first");
        assert!(mock.chat(&req).await.is_err());
        assert_eq!(mock.chat(&req).await.unwrap().text, "Echo from Mock: hello");
        assert_eq!(mock.calls(), 3);
    }
}
