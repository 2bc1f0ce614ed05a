//! Nexus 命令行入口
//!
//! 用法：`nexus [--config <path>] <goal...>`
//! 加载配置、初始化日志，组装路由器与编排器，执行一个目标并打印会话消息与最终结论。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nexus::config::{load_config, FileAiConfig};
use nexus::core::OrchestratorBuilder;
use nexus::llm::AiRouter;
use nexus::memory::MessageRole;

#[derive(Parser, Debug)]
#[command(name = "nexus", about = "Multi-agent orchestrator over a multi-provider model router")]
#[command(version)]
struct Cli {
    /// 额外的配置文件（叠加在 config/default.toml 之上）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 要完成的目标
    #[arg(required = true, trailing_var_arg = true)]
    goal: Vec<String>,
}

impl Cli {
    fn goal_text(&self) -> anyhow::Result<String> {
        let goal = self.goal.join(" ");
        anyhow::ensure!(!goal.trim().is_empty(), "goal must not be empty");
        Ok(goal)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nexus::observability::init();

    let cli = Cli::parse();
    let goal = cli.goal_text()?;
    let config_path = cli.config;
    let cfg = load_config(config_path.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let router = Arc::new(AiRouter::new(Arc::new(FileAiConfig { path: config_path })));
    let active = router.active_providers().await;
    tracing::info!(?active, "Providers initialized");

    let orchestrator = OrchestratorBuilder::new(cfg, router.clone()).build();
    let snapshot = orchestrator
        .run_goal(&goal)
        .await
        .context("Run failed")?;

    for msg in orchestrator.messages().await.context("Failed to read session")? {
        let who = match msg.role {
            MessageRole::User => "user".to_string(),
            MessageRole::System => "system".to_string(),
            MessageRole::Model => msg.agent_id.clone().unwrap_or_else(|| "model".to_string()),
        };
        println!("[{who}] {}\n", msg.content);
    }

    for step in &snapshot.plan.steps {
        println!("- {} ({}) {:?}", step.id, step.agent_id, step.status);
    }
    let usage = router.usage_report();
    println!(
        "tokens: {} | requests: {} | cost: ${:.4}",
        usage.total_tokens(),
        usage.total_requests(),
        usage.total_cost_usd
    );
    if let Some(err) = snapshot.error {
        anyhow::bail!(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_words_are_joined() {
        let cli = Cli::try_parse_from(["nexus", "--config", "local.toml", "explain", "rust", "lifetimes"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("local.toml")));
        assert_eq!(cli.goal_text().unwrap(), "explain rust lifetimes");
    }

    #[test]
    fn test_double_dash_is_not_part_of_goal() {
        let cli = Cli::try_parse_from(["nexus", "--", "--config", "is", "a", "word"]).unwrap();
        assert!(cli.config.is_none());
        assert_eq!(cli.goal_text().unwrap(), "--config is a word");
    }

    #[test]
    fn test_invalid_invocations_are_rejected() {
        assert!(Cli::try_parse_from(["nexus"]).is_err());
        assert!(Cli::try_parse_from(["nexus", "--config"]).is_err());
        let blank = Cli::try_parse_from(["nexus", " "]).unwrap();
        assert!(blank.goal_text().is_err());
    }
}
