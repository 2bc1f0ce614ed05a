//! 工具层：Tool trait、注册表、带超时与审计的执行器，以及 web_search / code_analysis

pub mod code_analysis;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod web_search;

pub use code_analysis::CodeAnalysisTool;
pub use executor::{ToolExecutor, ToolResponse, ToolResult, TOOL_NOT_FOUND};
pub use registry::{Tool, ToolRegistry};
pub use schema::{CodeAnalysisArgs, WebSearchArgs};
pub use web_search::WebSearchTool;
