//! Command Center：对外的 turn API
//!
//! - `execute(session_id?, request, mode)`：hardcoded 走确定性命令路径，agentic 走编排引擎
//! - `approve(session_id, approved)`：对挂起的遍历提交审批决定
//!
//! 每次调用全程持有会话锁；任何错误都折叠进响应（success=false + 文字说明），不向调用方抛出。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::command::{format_report, format_unknown, ActionKind, PlanExecutor, PlanRouter, RequestParser};
use crate::core::engine::{Engine, TurnOutcome};
use crate::core::error::OrchestratorError;
use crate::core::state::{FailureKind, OrchestrationState};
use crate::session::{Session, SessionRegistry};

/// 执行策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    #[default]
    Hardcoded,
    Agentic,
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingMode::Hardcoded => "hardcoded",
            RoutingMode::Agentic => "agentic",
        }
    }
}

/// 响应状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed,
    Suspended,
    AwaitingApproval,
    Rejected,
    NoPendingApproval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub status: TurnStatus,
    pub message: String,
    pub data: Value,
    pub session_id: String,
    pub mode: RoutingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub session_id: String,
    pub status: TurnStatus,
    pub success: bool,
    pub message: String,
    pub data: Value,
}

/// 单轮处理结果（尚未附加 session_id / mode）
struct Reply {
    success: bool,
    status: TurnStatus,
    message: String,
    data: Value,
}

impl Reply {
    fn failed(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            status: TurnStatus::Failed,
            message: message.into(),
            data,
        }
    }

    fn from_error(e: &OrchestratorError) -> Self {
        tracing::error!(error = %e, "turn failed");
        Self::failed(format!("✗ Error: {}", e), json!({ "error": e.to_string() }))
    }
}

pub struct CommandCenter {
    sessions: Arc<SessionRegistry>,
    parser: RequestParser,
    router: PlanRouter,
    executor: PlanExecutor,
    engine: Engine,
}

impl CommandCenter {
    pub fn new(sessions: Arc<SessionRegistry>, engine: Engine) -> Self {
        Self {
            sessions,
            parser: RequestParser::new(),
            router: PlanRouter::new(),
            executor: PlanExecutor::new(Arc::clone(engine.dispatcher())),
            engine,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn supported_actions(&self) -> Vec<&'static str> {
        self.router.supported_actions()
    }

    pub fn available_tools(&self) -> Vec<String> {
        self.engine.dispatcher().tool_names()
    }

    pub async fn execute(&self, session_id: Option<&str>, request: &str, mode: RoutingMode) -> ExecuteResponse {
        let (session_id, handle) = self.sessions.get_or_create(session_id).await;
        let mut session = handle.lock().await;
        session.touch();
        tracing::info!(session = %session_id, mode = mode.as_str(), request = %request, "execute");

        let reply = match mode {
            RoutingMode::Hardcoded => self.execute_hardcoded(&mut session, request).await,
            RoutingMode::Agentic => self.execute_agentic(&mut session, request).await,
        };

        ExecuteResponse {
            success: reply.success,
            status: reply.status,
            message: reply.message,
            data: reply.data,
            session_id,
            mode,
        }
    }

    pub async fn approve(&self, session_id: &str, approved: bool) -> ApproveResponse {
        let (session_id, handle) = self.sessions.get_or_create(Some(session_id)).await;
        let mut session = handle.lock().await;
        session.touch();

        let reply = match self.engine.resume(&mut session, approved).await {
            Ok(outcome) => self.finish_turn(&mut session, outcome),
            Err(OrchestratorError::NoPendingApproval(id)) => Reply {
                success: false,
                status: TurnStatus::NoPendingApproval,
                message: format!("No pending approval for session {}", id),
                data: json!({}),
            },
            Err(e) => Reply::from_error(&e),
        };

        ApproveResponse {
            session_id,
            status: reply.status,
            success: reply.success,
            message: reply.message,
            data: reply.data,
        }
    }

    async fn execute_hardcoded(&self, session: &mut Session, request: &str) -> Reply {
        let parsed = self.parser.parse(request);
        if parsed.is_unknown() {
            return Reply::failed(format_unknown(request), json!({ "parsed_intent": parsed }));
        }

        let plan = self.router.route(&parsed);
        if plan.is_empty() {
            return Reply::failed(
                format!("No action plan found for: {}", request),
                json!({ "parsed_intent": parsed }),
            );
        }

        let report = self.executor.execute(&plan, &session.tool_context()).await;

        if parsed.action == ActionKind::RunCommand {
            if let Some(command) = parsed.target.as_deref() {
                session.add_command(command);
            }
        }
        session.record_action(
            parsed.action.as_str(),
            json!({ "target": parsed.target, "steps": report.steps.len() }),
            report.success,
        );

        let message = format_report(parsed.action, &report);
        session.conversation.push_exchange(request, &message);

        Reply {
            success: report.success,
            status: if report.success {
                TurnStatus::Completed
            } else {
                TurnStatus::Failed
            },
            message,
            data: json!({
                "parsed_intent": parsed,
                "action_plan": plan,
                "execution_result": report,
            }),
        }
    }

    async fn execute_agentic(&self, session: &mut Session, request: &str) -> Reply {
        match self.engine.checkpoints().load(&session.id).await {
            Ok(Some(checkpoint)) if checkpoint.is_awaiting_approval() => {
                tracing::info!(session = %session.id, "execute refused, approval pending");
                return Reply {
                    success: false,
                    status: TurnStatus::AwaitingApproval,
                    message: "A previous operation is awaiting approval. Approve or reject it first.".to_string(),
                    data: json!({ "approval_request": checkpoint.state.approval_request }),
                };
            }
            Ok(_) => {}
            Err(e) => return Reply::from_error(&OrchestratorError::from(e)),
        }

        match self.engine.start(session, request).await {
            Ok(outcome) => self.finish_turn(session, outcome),
            Err(e) => Reply::from_error(&e),
        }
    }

    fn finish_turn(&self, session: &mut Session, outcome: TurnOutcome) -> Reply {
        match outcome {
            TurnOutcome::Suspended(state) => {
                let reason = state
                    .approval_request
                    .as_ref()
                    .map(|r| r.reason.as_str())
                    .unwrap_or("operation requires approval");
                Reply {
                    success: false,
                    status: TurnStatus::Suspended,
                    message: format!("⚠ Approval required: {}", reason),
                    data: turn_data(&state),
                }
            }
            TurnOutcome::Completed(state) => {
                let status = match state.failure.as_ref().map(|f| f.kind) {
                    None => TurnStatus::Completed,
                    Some(FailureKind::ApprovalRejected) => TurnStatus::Rejected,
                    Some(_) => TurnStatus::Failed,
                };
                let message = turn_message(&state);
                session.conversation.push_exchange(&state.request, &message);
                Reply {
                    success: state.succeeded(),
                    status,
                    message,
                    data: turn_data(&state),
                }
            }
        }
    }
}

/// 最终文字：回复 + 报告；没有报告时用失败原因
fn turn_message(state: &OrchestrationState) -> String {
    let summary = state
        .summary
        .clone()
        .or_else(|| state.failure.as_ref().map(|f| f.message.clone()));
    match (state.reply.as_deref(), summary) {
        (Some(reply), Some(summary)) => format!("{}\n\n{}", reply, summary),
        (Some(reply), None) => reply.to_string(),
        (None, Some(summary)) => summary,
        (None, None) => "Task completed".to_string(),
    }
}

fn turn_data(state: &OrchestrationState) -> Value {
    json!({
        "intent": state.intent,
        "mode": state.mode,
        "plan": state.plan,
        "tool_results": state.tool_results,
        "created_files": state.created_files,
        "modified_files": state.modified_files,
        "verification": state.verification,
        "errors": state.errors,
        "iterations": state.iterations,
        "approval_status": state.approval_status,
        "approval_request": state.approval_request,
        "failure": state.failure,
    })
}
