//! code_analysis：请模型对代码片段做简短审查

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{ChatProvider, ChatRequest};
use crate::memory::Message;
use crate::tools::schema::{parameters_schema, parse_args, CodeAnalysisArgs};
use crate::tools::Tool;

const REVIEWER_PROMPT: &str = "You are a senior code reviewer. Be concise, critical, and constructive.";

pub struct CodeAnalysisTool {
    provider: Arc<dyn ChatProvider>,
    model: String,
}

impl CodeAnalysisTool {
    pub fn new(provider: Arc<dyn ChatProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Tool for CodeAnalysisTool {
    fn name(&self) -> &str {
        "code_analysis"
    }

    fn description(&self) -> &str {
        "Analyze a snippet of code for potential bugs, security flaws, or improvements."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<CodeAnalysisArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CodeAnalysisArgs = parse_args(self.name(), args)?;
        let focus = args
            .focus
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or("general quality");
        let request = ChatRequest::new(
            self.model.clone(),
            vec![Message::user(format!(
                "Analyze this code focusing on {focus}:\n\n{}",
                args.code
            ))],
        )
        .with_system(REVIEWER_PROMPT);

        match self.provider.chat(&request).await {
            Ok(resp) if resp.text.trim().is_empty() => Ok("No analysis generated.".to_string()),
            Ok(resp) => Ok(resp.text),
            Err(e) => Err(format!("Analysis failed: {e}")),
        }
    }
}
