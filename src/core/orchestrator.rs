//! 多 Agent 编排器：规划 -> 按依赖逐步执行 -> 汇总
//!
//! 单一逻辑调度器：tick() 每次最多把一个就绪步骤推进到 active 并等待其完成；
//! run() 用固定间隔驱动 tick，run_goal() 连续 tick 直到运行结束。
//! 状态锁从不跨 await 持有；每次提交新目标都会递增 generation，
//! 旧计划中仍在途的步骤完成后比对 generation，不匹配则丢弃结果。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::agent::{default_agents, Agent, AgentStatus, COORDINATOR_ID};
use crate::config::{AppConfig, ModelDefaults};
use crate::core::error::OrchestratorError;
use crate::core::state::{RunMetrics, RunPhase, RunSnapshot, TickOutcome};
use crate::llm::{find_model, ChatProvider, ChatRequest, ChatResponse, LlmError};
use crate::memory::{
    ChatSession, LongTermMemory, MemoryTier, Message, MessageKind, MessageRole, MessageStore,
    SessionMessage, SharedWorkingMemory, ToolCallRecord, ToolCallStatus,
};
use crate::tools::ToolExecutor;
use crate::workflow::{parse_plan, ExecutionPlan, PlanStep};

const PLANNER_SYSTEM: &str = "You are an Orchestrator. Output valid JSON only.";
const SYNTHESIS_SYSTEM: &str = "You are the Coordinator. Summarize the findings.";

/// 编排器运行参数（来自 [orchestrator] 与 [ai] 配置）
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub defaults: ModelDefaults,
    /// 非空时所有 Agent 共用此模型
    pub selected_model: Option<String>,
    pub auto_switch_models: bool,
    pub memory_context_limit: usize,
    pub tick_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            defaults: cfg.ai.defaults.clone(),
            selected_model: cfg.orchestrator.selected_model.clone(),
            auto_switch_models: cfg.ai.preferences.auto_switch_models,
            memory_context_limit: cfg.orchestrator.memory_context_limit,
            tick_interval: Duration::from_millis(cfg.orchestrator.tick_interval_ms.max(1)),
        }
    }

    /// 关闭自动切换且未指定模型时，统一使用通用模型
    fn pinned_model(&self) -> Option<&str> {
        self.selected_model
            .as_deref()
            .or_else(|| (!self.auto_switch_models).then_some(self.defaults.general_model.as_str()))
    }

    fn model_for(&self, agent: &Agent) -> String {
        agent.role.model(&self.defaults, self.pinned_model()).to_string()
    }

    fn coordinator_model(&self) -> String {
        self.pinned_model()
            .unwrap_or(self.defaults.general_model.as_str())
            .to_string()
    }
}

#[derive(Default)]
struct RunState {
    phase: RunPhase,
    generation: u64,
    loading: bool,
    goal: Option<String>,
    plan: ExecutionPlan,
    agents: Vec<Agent>,
    metrics: RunMetrics,
    error: Option<String>,
    final_answer: Option<String>,
}

impl RunState {
    fn set_agent_status(&mut self, id: &str, status: AgentStatus) {
        if let Some(agent) = self.agents.iter_mut().find(|a| a.id == id) {
            agent.status = status;
        }
    }

    /// 计划中的 agentId 不存在时退回阵容第一个
    fn agent_for(&self, id: &str) -> Option<Agent> {
        self.agents
            .iter()
            .find(|a| a.id == id)
            .or_else(|| self.agents.first())
            .cloned()
    }
}

/// tick 开始时在锁内做出的决定
enum Claim {
    Nothing,
    Finish(u64),
    Step(StepTicket),
    /// 阵容为空，就绪步骤无人可执行
    Unassigned(u64, String),
}

const NO_AGENT: &str = "No agent available to execute this step";

/// 一个步骤被领取后、执行前的全部输入
struct StepTicket {
    generation: u64,
    step: PlanStep,
    agent: Agent,
    context: String,
}

struct StepOutput {
    text: String,
    thinking: Option<String>,
}

pub struct Orchestrator {
    router: Arc<dyn ChatProvider>,
    tools: ToolExecutor,
    long_term: Arc<dyn LongTermMemory>,
    store: Arc<dyn MessageStore>,
    session_id: String,
    memory: SharedWorkingMemory,
    settings: OrchestratorSettings,
    state: Mutex<RunState>,
    /// 保证同一时刻只有一个 tick 在推进
    tick_gate: AsyncMutex<()>,
}

impl Orchestrator {
    pub fn new(
        router: Arc<dyn ChatProvider>,
        tools: ToolExecutor,
        long_term: Arc<dyn LongTermMemory>,
        store: Arc<dyn MessageStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            router,
            tools,
            long_term,
            store,
            session_id: uuid::Uuid::new_v4().to_string(),
            memory: SharedWorkingMemory::new(),
            settings,
            state: Mutex::new(RunState {
                agents: default_agents(),
                ..RunState::default()
            }),
            tick_gate: AsyncMutex::new(()),
        }
    }

    /// 指定会话 id（默认随机生成）
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// 替换 Agent 阵容；第一个 Agent 兼任未知 agentId 的兜底执行者
    pub fn with_agents(self, agents: Vec<Agent>) -> Self {
        self.lock().agents = agents;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn working_memory(&self) -> &SharedWorkingMemory {
        &self.memory
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let state = self.lock();
        RunSnapshot {
            phase: state.phase,
            generation: state.generation,
            loading: state.loading,
            goal: state.goal.clone(),
            plan: state.plan.view(),
            agents: state.agents.clone(),
            memory: self.memory.snapshot(),
            metrics: state.metrics,
            error: state.error.clone(),
            final_answer: state.final_answer.clone(),
        }
    }

    /// 路由调用并记入运行指标
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let result = self.router.chat(request).await;
        let mut state = self.lock();
        match &result {
            Ok(resp) => state.metrics.record(resp.usage),
            Err(_) => {
                state.metrics.requests += 1;
                state.metrics.errors += 1;
            }
        }
        result
    }

    /// 提交新目标：重置运行、存入长期记忆、请求并校验计划
    ///
    /// 规划失败或计划不合法时运行进入 failed 并返回错误，不会执行任何步骤。
    pub async fn submit_goal(&self, goal: &str) -> Result<(), OrchestratorError> {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.phase = RunPhase::Planning;
            state.loading = true;
            state.goal = Some(goal.to_string());
            state.plan = ExecutionPlan::default();
            state.error = None;
            state.final_answer = None;
            // 上一代计划中途被替换时，其执行中的 Agent 不会再被复位
            for agent in state.agents.iter_mut().filter(|a| a.status == AgentStatus::Executing) {
                agent.status = AgentStatus::Idle;
            }
            state.set_agent_status(COORDINATOR_ID, AgentStatus::Thinking);
            state.generation
        };
        self.memory.clear();
        tracing::info!(generation, "New goal submitted");

        self.append_logged(SessionMessage::new(
            uuid::Uuid::new_v4().to_string(),
            MessageRole::User,
            goal,
        ))
        .await;

        self.long_term
            .add(goal, MemoryTier::ShortTerm, &["user_query".to_string()]);
        let context = self
            .long_term
            .context(goal, self.settings.memory_context_limit);

        let agents_json = {
            let state = self.lock();
            let listed: Vec<_> = state
                .agents
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "id": a.id,
                        "name": a.name,
                        "role": a.role,
                        "specialty": a.specialty,
                    })
                })
                .collect();
            serde_json::Value::Array(listed).to_string()
        };
        let prompt = format!(
            "Context: {context}\nUser Request: {goal}\nAvailable Agents: {agents_json}\n\
             Create a JSON execution plan with id, agentId, description, dependencies.\nReturn ONLY JSON."
        );
        let model = self.settings.coordinator_model();
        let request = ChatRequest::new(model.clone(), vec![Message::user(prompt)]).with_system(PLANNER_SYSTEM);

        let response = match self.call(&request).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Planning call failed");
                let err = OrchestratorError::Planning(e);
                self.fail_run(generation, &err).await;
                return Err(err);
            }
        };

        let plan = match parse_plan(&response.text) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "Plan rejected");
                let err = OrchestratorError::PlanMalformed(e);
                self.fail_run(generation, &err).await;
                return Err(err);
            }
        };

        let lines: Vec<String> = plan
            .steps()
            .iter()
            .map(|s| format!("• **{}**: {}", s.agent_id, s.description))
            .collect();
        {
            let mut state = self.lock();
            if state.generation != generation {
                return Ok(());
            }
            state.plan = plan;
            state.phase = RunPhase::Executing;
            state.set_agent_status(COORDINATOR_ID, AgentStatus::Idle);
        }
        tracing::info!(generation, steps = lines.len(), "Plan accepted");

        let model_name = find_model(&model).map(|m| m.name).unwrap_or(model.as_str());
        self.append_logged(
            SessionMessage::new(
                uuid::Uuid::new_v4().to_string(),
                MessageRole::Model,
                format!(
                    "I have devised an execution plan using **{model_name}**:\n\n{}",
                    lines.join("\n")
                ),
            )
            .with_agent(COORDINATOR_ID)
            .with_kind(MessageKind::Plan)
            .with_thinking(response.thinking),
        )
        .await;
        Ok(())
    }

    async fn fail_run(&self, generation: u64, err: &OrchestratorError) {
        {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.phase = RunPhase::Failed;
            state.loading = false;
            state.error = Some(err.to_string());
            state.set_agent_status(COORDINATOR_ID, AgentStatus::Idle);
        }
        self.append_logged(SessionMessage::new(
            uuid::Uuid::new_v4().to_string(),
            MessageRole::System,
            err.to_string(),
        ))
        .await;
    }

    /// 推进一次：领取第一个就绪步骤并执行；全部终态时进入汇总
    pub async fn tick(&self) -> Result<TickOutcome, OrchestratorError> {
        let _gate = self.tick_gate.lock().await;

        let claim = {
            let mut state = self.lock();
            if state.phase != RunPhase::Executing {
                Claim::Nothing
            } else if state.plan.all_terminal() {
                Claim::Finish(state.generation)
            } else {
                match state
                    .plan
                    .next_ready()
                    .cloned()
                    .map(|step| {
                        let agent = state.agent_for(&step.agent_id);
                        (step, agent)
                    }) {
                    None => Claim::Nothing,
                    Some((step, None)) => {
                        state.plan.mark_failed(&step.id, NO_AGENT);
                        Claim::Unassigned(state.generation, step.id)
                    }
                    Some((step, Some(agent))) => {
                        state.plan.mark_active(&step.id);
                        state.set_agent_status(&agent.id, AgentStatus::Executing);
                        let context = self.task_context(&state.plan, &step);
                        Claim::Step(StepTicket {
                            generation: state.generation,
                            step,
                            agent,
                            context,
                        })
                    }
                }
            }
        };
        let ticket = match claim {
            Claim::Nothing => return Ok(TickOutcome::Idle),
            Claim::Finish(generation) => return self.finish(generation).await,
            Claim::Unassigned(generation, step_id) => {
                tracing::error!(step_id = %step_id, "Step failed: no agent available");
                self.append_logged(SessionMessage::new(
                    uuid::Uuid::new_v4().to_string(),
                    MessageRole::System,
                    format!("Task Failed: {NO_AGENT}"),
                ))
                .await;
                return self.settle(generation, TickOutcome::StepFailed(step_id)).await;
            }
            Claim::Step(ticket) => ticket,
        };

        self.memory
            .push_thought(format!("Agent {} starting step: {}", ticket.agent.name, ticket.step.description));
        tracing::info!(step_id = %ticket.step.id, agent_id = %ticket.agent.id, "Step started");

        let result = self.run_step(&ticket).await;

        let outcome = {
            let mut state = self.lock();
            if state.generation != ticket.generation {
                tracing::warn!(step_id = %ticket.step.id, "Discarding result from superseded plan");
                return Ok(TickOutcome::Stale);
            }
            state.set_agent_status(&ticket.agent.id, AgentStatus::Idle);
            match &result {
                Ok(out) => {
                    state.plan.mark_completed(&ticket.step.id, out.text.clone());
                    TickOutcome::StepCompleted(ticket.step.id.clone())
                }
                Err(e) => {
                    if let Some(skipped) = state.plan.mark_failed(&ticket.step.id, e.to_string()) {
                        if !skipped.is_empty() {
                            tracing::warn!(step_id = %ticket.step.id, ?skipped, "Dependents skipped");
                        }
                    }
                    TickOutcome::StepFailed(ticket.step.id.clone())
                }
            }
        };

        match result {
            Ok(out) => {
                tracing::info!(step_id = %ticket.step.id, agent_id = %ticket.agent.id, "Step completed");
                let short_id: String = ticket.step.id.chars().take(4).collect();
                self.memory.update_scratchpad(
                    format!("step_output_{short_id}"),
                    out.text.chars().take(50).collect::<String>(),
                );
                self.long_term.add(
                    &format!("Agent {} completed: {}", ticket.agent.name, ticket.step.description),
                    MemoryTier::ShortTerm,
                    &[ticket.agent.role.as_str().to_string()],
                );
                self.append_logged(
                    SessionMessage::new(format!("res-{}", ticket.step.id), MessageRole::Model, out.text)
                        .with_agent(ticket.agent.id.clone())
                        .with_thinking(out.thinking)
                        .with_kind(MessageKind::Result),
                )
                .await;
            }
            Err(e) => {
                tracing::error!(step_id = %ticket.step.id, agent_id = %ticket.agent.id, error = %e, "Step failed");
                self.append_logged(SessionMessage::new(
                    uuid::Uuid::new_v4().to_string(),
                    MessageRole::System,
                    format!("Task Failed: {e}"),
                ))
                .await;
            }
        }

        self.settle(ticket.generation, outcome).await
    }

    /// 步骤落定后：计划全部终态则进入汇总，否则返回该步骤的结果
    async fn settle(&self, generation: u64, outcome: TickOutcome) -> Result<TickOutcome, OrchestratorError> {
        let done = {
            let state = self.lock();
            (state.generation == generation && state.plan.all_terminal()).then_some(generation)
        };
        match done {
            Some(generation) => match self.finish(generation).await? {
                TickOutcome::Idle | TickOutcome::Stale => Ok(outcome),
                finished => Ok(finished),
            },
            None => Ok(outcome),
        }
    }

    /// 拼接任务上下文：目标、依赖输出、草稿板
    fn task_context(&self, plan: &ExecutionPlan, step: &PlanStep) -> String {
        let deps: Vec<String> = step
            .dependencies
            .iter()
            .map(|d| {
                let output = plan
                    .get(d)
                    .and_then(|s| s.result.clone())
                    .unwrap_or_else(|| "(No output)".to_string());
                format!("[Input from Step {d}]: {output}")
            })
            .collect();
        format!(
            "GOAL: {}\nDEPENDENCY CONTEXT: {}\nACTIVE SCRATCHPAD: {}",
            step.description,
            deps.join("\n\n"),
            self.memory.scratchpad_json()
        )
    }

    /// 执行单个步骤：一次模型调用；若返回工具调用，执行后再调用一次取最终文本
    async fn run_step(&self, ticket: &StepTicket) -> Result<StepOutput, LlmError> {
        let agent = &ticket.agent;
        let model = self.settings.model_for(agent);
        let task = format!("TASK CONTEXT:\n{}", ticket.context);

        let request = ChatRequest::new(model.clone(), vec![Message::user(task.clone())])
            .with_system(format!(
                "{}\n\nYou have access to tools. Use them if necessary.",
                agent.system_prompt
            ))
            .with_capabilities(agent.role.required_capabilities())
            .with_tools(self.tools.declarations_for(agent.role.tool_names()));

        let first = self.call(&request).await?;
        if !first.has_tool_calls() {
            return Ok(StepOutput {
                text: first.text,
                thinking: first.thinking,
            });
        }

        let message_id = format!("tool-{}", uuid::Uuid::new_v4());
        let records: Vec<ToolCallRecord> = first
            .tool_calls
            .iter()
            .map(|c| ToolCallRecord {
                id: c.id.clone(),
                tool_name: c.name.clone(),
                args: c.args.clone(),
                status: ToolCallStatus::Pending,
                result: None,
            })
            .collect();
        let content = first
            .thinking
            .clone()
            .unwrap_or_else(|| "Executing tools...".to_string());
        self.append_logged(
            SessionMessage::new(message_id.clone(), MessageRole::Model, content)
                .with_agent(agent.id.clone())
                .with_tool_calls(records),
        )
        .await;

        let responses = self.tools.execute_calls(&first.tool_calls, &self.memory).await;

        let previews: Vec<(String, String)> = responses
            .iter()
            .map(|r| {
                let json = serde_json::to_string(&r.response).unwrap_or_default();
                (r.id.clone(), json.chars().take(100).collect())
            })
            .collect();
        self.update_logged(&message_id, |msg| {
            for record in &mut msg.tool_calls {
                record.status = ToolCallStatus::Success;
                record.result = previews
                    .iter()
                    .find(|(id, _)| *id == record.id)
                    .map(|(_, p)| p.clone());
            }
        })
        .await;

        let results_json = serde_json::to_string(&responses).unwrap_or_else(|_| "[]".to_string());
        let follow_up = ChatRequest::new(
            model,
            vec![
                Message::user(task),
                Message::assistant("Tool calls made."),
                Message::user(format!("Tool Results: {results_json}")),
            ],
        )
        .with_system(agent.system_prompt.clone())
        .with_capabilities(agent.role.required_capabilities());

        let second = self.call(&follow_up).await?;
        Ok(StepOutput {
            text: second.text,
            thinking: second.thinking.or(first.thinking),
        })
    }

    /// 全部步骤终态后调用一次：有失败则跳过汇总，否则请求总结并发布
    async fn finish(&self, generation: u64) -> Result<TickOutcome, OrchestratorError> {
        let results = {
            let mut state = self.lock();
            if state.generation != generation || !state.loading {
                return Ok(TickOutcome::Idle);
            }
            if state.plan.any_failed() {
                state.loading = false;
                state.phase = RunPhase::Failed;
                tracing::warn!(generation, "Run finished with failed steps, synthesis skipped");
                return Ok(TickOutcome::RunFailed);
            }
            state.phase = RunPhase::Synthesizing;
            state.set_agent_status(COORDINATOR_ID, AgentStatus::Thinking);
            state.plan.results()
        };

        let results_json = serde_json::to_string(&results).unwrap_or_else(|_| "{}".to_string());
        let request = ChatRequest::new(
            self.settings.coordinator_model(),
            vec![Message::user(format!(
                "All steps complete. Synthesize these results:\n{results_json}"
            ))],
        )
        .with_system(SYNTHESIS_SYSTEM);

        let response = self.call(&request).await;

        {
            let mut state = self.lock();
            if state.generation != generation {
                return Ok(TickOutcome::Stale);
            }
            state.loading = false;
            state.set_agent_status(COORDINATOR_ID, AgentStatus::Idle);
            match &response {
                Ok(r) => {
                    state.phase = RunPhase::Idle;
                    state.final_answer = Some(r.text.clone());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Final synthesis failed");
                    state.phase = RunPhase::Failed;
                    state.error = Some("Final synthesis failed".to_string());
                }
            }
        }

        let response = response.map_err(OrchestratorError::Synthesis)?;
        tracing::info!(generation, "Run synthesized");
        self.append_logged(
            SessionMessage::new(uuid::Uuid::new_v4().to_string(), MessageRole::Model, response.text)
                .with_agent(COORDINATOR_ID)
                .with_thinking(response.thinking),
        )
        .await;
        Ok(TickOutcome::Synthesized)
    }

    /// 固定间隔驱动 tick，直到取消
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Orchestrator loop cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Tick failed");
                    }
                }
            }
        }
    }

    /// 提交目标并持续推进直到运行结束，返回最终快照
    pub async fn run_goal(&self, goal: &str) -> Result<RunSnapshot, OrchestratorError> {
        self.submit_goal(goal).await?;
        loop {
            let outcome = self.tick().await?;
            let in_progress = self.lock().phase.in_progress();
            if !in_progress {
                break;
            }
            if matches!(outcome, TickOutcome::Idle | TickOutcome::Stale) {
                tokio::time::sleep(self.settings.tick_interval).await;
            }
        }
        Ok(self.snapshot())
    }

    /// 追加一条会话消息并刷新会话索引
    async fn append_message(&self, msg: SessionMessage) -> anyhow::Result<()> {
        let mut messages = self.store.get_messages(&self.session_id).await?;
        messages.push(msg.clone());
        self.store.save_messages(&self.session_id, &messages).await?;

        let mut sessions = self.store.get_sessions().await?;
        match sessions.iter_mut().find(|s| s.id == self.session_id) {
            Some(session) => session.touch(&msg),
            None => {
                let mut session = ChatSession::new(self.session_id.clone());
                session.touch(&msg);
                sessions.insert(0, session);
            }
        }
        self.store.save_sessions(&sessions).await
    }

    /// 运行中途的消息写入失败只记日志，不影响计划状态
    async fn append_logged(&self, msg: SessionMessage) {
        if let Err(e) = self.append_message(msg).await {
            tracing::warn!(error = %e, "Failed to persist session message");
        }
    }

    async fn update_logged(&self, id: &str, f: impl FnOnce(&mut SessionMessage)) {
        let result: anyhow::Result<()> = async move {
            let mut messages = self.store.get_messages(&self.session_id).await?;
            if let Some(msg) = messages.iter_mut().find(|m| m.id == id) {
                f(msg);
                self.store.save_messages(&self.session_id, &messages).await?;
            }
            Ok(())
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to update session message");
        }
    }

    /// 当前会话的全部消息
    pub async fn messages(&self) -> Result<Vec<SessionMessage>, OrchestratorError> {
        Ok(self.store.get_messages(&self.session_id).await?)
    }
}
