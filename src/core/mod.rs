//! 核心编排层：重试包装、运行错误、状态投影、编排器与其构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod resilience;
pub mod state;

pub use builder::OrchestratorBuilder;
pub use error::OrchestratorError;
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use resilience::{is_auth_failure, with_retry, RetryConfig};
pub use state::{RunMetrics, RunPhase, RunSnapshot, TickOutcome};
