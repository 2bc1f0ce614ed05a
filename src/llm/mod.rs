//! LLM 层：模型注册表、规范请求 / 响应、上游适配器、路由器与测试替身

pub mod mock;
pub mod providers;
pub mod registry;
pub mod router;
pub mod traits;
pub mod types;

pub use mock::ScriptedProvider;
pub use providers::{build_provider, ProviderSettings};
pub use registry::{find_model, list_models, models_by_provider, Capability, Model, ProviderId};
pub use router::{find_replacement, AiRouter, ProviderFactory, ProviderUsage, UsageReport};
pub use traits::{ChatProvider, LlmError};
pub use types::{ChatRequest, ChatResponse, ToolCall, ToolDeclaration, Usage};
