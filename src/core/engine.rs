//! 编排引擎：驱动状态机遍历
//!
//! 循环：执行当前节点 → 得到事件 → `transition` 得到下一节点 → 保存检查点。
//! 到达 Done 返回 Completed，到达 Suspended 返回 Suspended（检查点已落盘，可跨进程 resume）。
//! 调用方需持有会话锁，保证同一会话只有一个活跃遍历。

use std::sync::Arc;

use serde_json::Value;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::OrchestrationSection;
use crate::core::error::OrchestratorError;
use crate::core::machine::{transition, Event, Node};
use crate::core::state::{FailureKind, OrchestrationState};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::{self, hil, AgentTurn, HilDecision, PolicyGate, Planner, AGENT_SYSTEM_PROMPT};
use crate::session::Session;
use crate::tools::{Capability, ToolDispatcher};

/// 引擎参数
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub max_iterations: usize,
    pub planning_token_threshold: usize,
    pub summary_max_errors: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&OrchestrationSection::default())
    }
}

impl From<&OrchestrationSection> for EngineSettings {
    fn from(cfg: &OrchestrationSection) -> Self {
        Self {
            max_iterations: cfg.max_iterations.max(1),
            planning_token_threshold: cfg.planning_token_threshold,
            summary_max_errors: cfg.summary_max_errors,
        }
    }
}

/// 一次遍历的结果
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// 到达终点（成功或失败看 state.failure）
    Completed(OrchestrationState),
    /// 挂起等待审批
    Suspended(OrchestrationState),
}

impl TurnOutcome {
    pub fn state(&self) -> &OrchestrationState {
        match self {
            TurnOutcome::Completed(s) | TurnOutcome::Suspended(s) => s,
        }
    }

    pub fn into_state(self) -> OrchestrationState {
        match self {
            TurnOutcome::Completed(s) | TurnOutcome::Suspended(s) => s,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, TurnOutcome::Suspended(_))
    }
}

pub struct Engine {
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<ToolDispatcher>,
    checkpoints: Arc<dyn CheckpointStore>,
    planner: Planner,
    policy: PolicyGate,
    settings: EngineSettings,
    system_prompt: String,
}

impl Engine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: Arc<ToolDispatcher>,
        checkpoints: Arc<dyn CheckpointStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            planner: Planner::new(Arc::clone(&llm)),
            llm,
            dispatcher,
            checkpoints,
            policy: PolicyGate::default(),
            settings,
            system_prompt: AGENT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_policy(mut self, policy: PolicyGate) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// 新一轮遍历：以会话对话历史 + 本轮请求为初始状态，从 ingress 开始
    pub async fn start(&self, session: &mut Session, request: &str) -> Result<TurnOutcome, OrchestratorError> {
        if let Some(stale) = self.checkpoints.load(&session.id).await? {
            if !stale.node.is_resting() {
                tracing::warn!(
                    session = %session.id,
                    node = %stale.node,
                    "found an interrupted traversal, starting fresh"
                );
            }
        }
        let state = OrchestrationState::new(session.id.clone(), request, session.conversation.messages());
        self.checkpoints.save(&Checkpoint::new(Node::Ingress, &state)).await?;
        self.drive(session, Node::Ingress, state).await
    }

    /// 提交审批决定并从挂起点继续；没有待审批的检查点时返回 NoPendingApproval
    pub async fn resume(&self, session: &mut Session, approved: bool) -> Result<TurnOutcome, OrchestratorError> {
        let checkpoint = self
            .checkpoints
            .load(&session.id)
            .await?
            .filter(Checkpoint::is_awaiting_approval)
            .ok_or_else(|| OrchestratorError::NoPendingApproval(session.id.clone()))?;

        let mut state = checkpoint.state;
        hil::apply_decision(&mut state, approved);
        tracing::info!(session = %session.id, approved, "approval decision received");

        let node = transition(Node::Suspended, &Event::Resumed)?;
        self.checkpoints.save(&Checkpoint::new(node, &state)).await?;
        self.drive(session, node, state).await
    }

    async fn drive(
        &self,
        session: &mut Session,
        mut node: Node,
        mut state: OrchestrationState,
    ) -> Result<TurnOutcome, OrchestratorError> {
        loop {
            match node {
                Node::Done => return Ok(TurnOutcome::Completed(state)),
                Node::Suspended => return Ok(TurnOutcome::Suspended(state)),
                _ => {}
            }
            let event = self.step(node, session, &mut state).await?;
            let next = transition(node, &event)?;
            tracing::debug!(session = %state.session_id, from = %node, to = %next, event = %event, "transition");
            if next == Node::Done {
                // 完成的遍历不再需要恢复，历史已回写进会话
                self.checkpoints.delete(&state.session_id).await?;
            } else {
                self.checkpoints.save(&Checkpoint::new(next, &state)).await?;
            }
            node = next;
        }
    }

    async fn step(
        &self,
        node: Node,
        session: &mut Session,
        state: &mut OrchestrationState,
    ) -> Result<Event, OrchestratorError> {
        let event = match node {
            Node::Ingress => ingress(state),
            Node::Router => self.route(state),
            Node::ChatAgent => self.chat(state).await,
            Node::Planner => self.plan(state).await,
            Node::Agent => self.agent(session, state).await,
            Node::CodeTools | Node::WebTools | Node::ActionTools => match node.capability() {
                Some(cap) => self.run_tools(cap, session, state).await,
                None => unreachable_node(node)?,
            },
            Node::Verify => self.verify(state),
            Node::Hil => match hil::gate(state) {
                HilDecision::PassThrough => Event::Clear,
                HilDecision::Suspend => Event::AwaitingApproval,
                HilDecision::Approved => Event::Approved,
                HilDecision::Rejected => Event::Denied,
            },
            Node::Summarize => {
                state.summary = Some(react::summarize(state, self.settings.summary_max_errors));
                Event::Summarized
            }
            Node::Suspended | Node::Done => unreachable_node(node)?,
        };
        Ok(event)
    }

    fn route(&self, state: &mut OrchestrationState) -> Event {
        let message = state.latest_user_message().unwrap_or_default();
        let c = react::classify(message, self.settings.planning_token_threshold);
        tracing::info!(intent = c.intent.as_str(), mode = c.mode.as_str(), "request classified");
        state.intent = Some(c.intent);
        state.mode = Some(c.mode);
        Event::Classified {
            intent: c.intent,
            mode: c.mode,
        }
    }

    async fn chat(&self, state: &mut OrchestrationState) -> Event {
        match react::chat_reply(self.llm.as_ref(), state).await {
            Ok(reply) => {
                state.messages.push(Message::assistant(reply.clone()));
                state.reply = Some(reply);
                Event::Replied
            }
            Err(e) => {
                tracing::error!(error = %e, "chat oracle call failed");
                state.fail(FailureKind::Oracle, OrchestratorError::Oracle(e).to_string());
                Event::Aborted
            }
        }
    }

    async fn plan(&self, state: &mut OrchestrationState) -> Event {
        let outcome = self.planner.plan(&state.request).await;
        state.set_plan(outcome.plan);
        if let Some(error) = outcome.error {
            state.record_error(error);
        }
        Event::Planned
    }

    async fn agent(&self, session: &Session, state: &mut OrchestrationState) -> Event {
        let max = self.settings.max_iterations;
        if state.iterations >= max {
            tracing::warn!(session = %state.session_id, max, "iteration cap reached");
            state.fail(
                FailureKind::MaxIterationsExceeded,
                OrchestratorError::MaxIterationsExceeded(max).to_string(),
            );
            return Event::Aborted;
        }
        state.iterations += 1;

        let context = session.context_for_llm();
        let catalog = self.dispatcher.catalog();
        let turn = react::think(self.llm.as_ref(), &self.system_prompt, state, &context, &catalog).await;

        match turn {
            Ok(AgentTurn::Reply(text)) => {
                state.messages.push(Message::assistant(text.clone()));
                state.reply = Some(text);
                state.complete_current_step();
                Event::Finished
            }
            Ok(AgentTurn::ToolCalls { content, calls }) => {
                let first = Capability::route(&calls[0].name);
                tracing::info!(
                    iteration = state.iterations,
                    calls = calls.len(),
                    first = %calls[0].name,
                    "agent proposed tool calls"
                );
                state.messages.push(Message::assistant_with_calls(content, calls.clone()));
                state.tool_calls = calls;
                Event::ToolsProposed(first)
            }
            Err(e) => {
                tracing::error!(error = %e, "agent oracle call failed");
                state.fail(FailureKind::Oracle, OrchestratorError::Oracle(e).to_string());
                Event::Aborted
            }
        }
    }

    /// 执行属于 cap 的待执行调用（保持原顺序），其余留给下一个工具节点
    async fn run_tools(&self, cap: Capability, session: &mut Session, state: &mut OrchestrationState) -> Event {
        let pending = std::mem::take(&mut state.tool_calls);
        let (batch, rest): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|c| Capability::route(&c.name) == cap);
        state.tool_calls = rest;

        for call in batch {
            let ctx = session.tool_context();
            let result = self.dispatcher.invoke(&call, &ctx).await;
            session.apply_tool_result(&call, &result);

            if call.name == "write_file" && result.success {
                if let Some(payload) = result.payload.as_ref() {
                    track_written_file(state, payload);
                }
            }

            state.messages.push(Message::tool(call.id.clone(), result.to_message_content()));
            state.tool_results.push(result);
            state.executed_calls.push(react::verify::record_resolved_paths(call, &ctx));
        }

        Event::ToolsExecuted {
            remaining: state.tool_calls.first().map(|c| Capability::route(&c.name)),
        }
    }

    fn verify(&self, state: &mut OrchestrationState) -> Event {
        let (verification, violations) = self.policy.evaluate(state);
        state.verification = Some(verification);
        match violations.first() {
            Some(v) => {
                tracing::warn!(session = %state.session_id, reason = %v.reason, "approval required");
                state.request_approval(v.to_request());
                Event::ApprovalRequired
            }
            None => Event::Clear,
        }
    }
}

fn ingress(state: &mut OrchestrationState) -> Event {
    if state.request.trim().is_empty() {
        state.fail(FailureKind::InvalidRequest, "Empty request");
        Event::Rejected
    } else {
        Event::Validated
    }
}

fn track_written_file(state: &mut OrchestrationState, payload: &Value) {
    let Some(path) = payload.get("file_path").and_then(Value::as_str) else {
        return;
    };
    let created = payload.get("created").and_then(Value::as_bool).unwrap_or(false);
    let list = if created {
        &mut state.created_files
    } else {
        &mut state.modified_files
    };
    if !list.iter().any(|p| p == path) {
        list.push(path.to_string());
    }
}

fn unreachable_node(node: Node) -> Result<Event, OrchestratorError> {
    Err(OrchestratorError::InvalidTransition {
        node,
        event: "execute".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::core::{ApprovalStatus, ToolCall};
    use crate::llm::{LlmError, LlmReply, ScriptedLlmClient};
    use crate::tools::{Tool, ToolContext, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        name: &'static str,
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Recording {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "records invocations"
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, String> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "args": args }))
        }
    }

    fn engine(script: Vec<Result<LlmReply, LlmError>>, tools: &[&'static str]) -> (Engine, Arc<AtomicUsize>, Arc<ScriptedLlmClient>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        for name in tools {
            registry.register(Recording {
                name: *name,
                hits: Arc::clone(&hits),
            });
        }
        let llm = Arc::new(ScriptedLlmClient::new(script));
        let engine = Engine::new(
            llm.clone(),
            Arc::new(ToolDispatcher::new(registry, 5)),
            Arc::new(MemoryCheckpointStore::new()),
            EngineSettings::default(),
        );
        (engine, hits, llm)
    }

    fn session() -> Session {
        Session::new("s1", std::env::temp_dir(), 10, 20)
    }

    #[tokio::test]
    async fn test_completed_turn_drops_its_checkpoint() {
        let (engine, _, _) = engine(vec![Ok(LlmReply::text("hi"))], &[]);
        let mut session = session();
        let outcome = engine.start(&mut session, "hello").await.unwrap();
        assert!(!outcome.is_suspended());
        assert!(engine.checkpoints().load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected_and_summarized() {
        let (engine, _, llm) = engine(vec![], &[]);
        let outcome = engine.start(&mut session(), "   ").await.unwrap();
        let state = outcome.into_state();
        assert_eq!(state.failure.unwrap().kind, FailureKind::InvalidRequest);
        assert!(state.summary.unwrap().contains("Empty request"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mixed_capability_calls_all_run_before_next_oracle_call() {
        let calls = vec![
            ToolCall::new("c1", "read_file", json!({"file_path": "a.rs"})),
            ToolCall::new("c2", "get_current_directory", json!({})),
            ToolCall::new("c3", "list_files", json!({})),
        ];
        let (engine, hits, llm) = engine(
            vec![Ok(LlmReply::tool_calls(calls)), Ok(LlmReply::text("all done"))],
            &["read_file", "list_files", "get_current_directory"],
        );
        let outcome = engine.start(&mut session(), "show me the file").await.unwrap();
        let state = outcome.into_state();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        let order: Vec<&str> = state.executed_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["c1", "c3", "c2"]);
        // 第二次模型调用时三个 tool 消息都已存在
        let second = llm.messages_of_call(1).unwrap();
        assert_eq!(second.iter().filter(|m| m.role == crate::memory::Role::Tool).count(), 3);
        assert_eq!(state.reply.as_deref(), Some("all done"));
        assert!(state.succeeded());
    }

    #[tokio::test]
    async fn test_iteration_cap_aborts_turn() {
        let looping: Vec<_> = (0..10)
            .map(|i| {
                Ok(LlmReply::tool_calls(vec![ToolCall::new(
                    format!("c{i}"),
                    "list_files",
                    json!({}),
                )]))
            })
            .collect();
        let (engine, _, llm) = engine(looping, &["list_files"]);
        let state = engine.start(&mut session(), "list files forever").await.unwrap().into_state();
        assert_eq!(llm.call_count(), EngineSettings::default().max_iterations);
        let failure = state.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::MaxIterationsExceeded);
        assert!(failure.message.starts_with("Maximum iterations reached (5)"));
    }

    #[tokio::test]
    async fn test_oracle_error_is_fatal_for_turn() {
        let (engine, _, _) = engine(vec![Err(LlmError::Auth("bad key".into()))], &[]);
        let state = engine.start(&mut session(), "list files").await.unwrap().into_state();
        assert_eq!(state.failure.as_ref().unwrap().kind, FailureKind::Oracle);
        assert!(state.errors[0].starts_with("LLM error:"));
    }

    #[tokio::test]
    async fn test_service_call_suspends_and_resume_does_not_replay_tools() {
        let calls = vec![ToolCall::new("c1", "stop_service", json!({"service_name": "nginx"}))];
        let (engine, hits, llm) = engine(
            vec![Ok(LlmReply::tool_calls(calls)), Ok(LlmReply::text("stopped"))],
            &["stop_service"],
        );
        let mut s = session();
        let outcome = engine.start(&mut s, "stop the nginx service").await.unwrap();
        assert!(outcome.is_suspended());
        assert_eq!(outcome.state().approval_status, ApprovalStatus::Pending);

        let resumed = engine.resume(&mut s, true).await.unwrap();
        let state = resumed.into_state();
        assert!(state.succeeded());
        assert!(state.summary.is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(llm.call_count(), 2);

        let again = engine.resume(&mut s, true).await;
        assert!(matches!(again, Err(OrchestratorError::NoPendingApproval(_))));
    }
}
