//! 编排状态定义：OrchestrationState 及其组成（计划、工具调用、审批）
//!
//! OrchestrationState 是检查点的最小单元：每次节点迁移后整体持久化，恢复时原样还原，不重放已完成节点。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::{Message, Role};

/// 请求意图（粗粒度分类，用于选择执行策略）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Chat,
    Code,
    Web,
    Action,
    Complex,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Chat => "chat",
            Intent::Code => "code",
            Intent::Web => "web",
            Intent::Action => "action",
            Intent::Complex => "complex",
        }
    }
}

/// 执行模式：simple 直接进入 agent，planning 先经 Planner 拆解
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Simple,
    Planning,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Simple => "simple",
            ExecutionMode::Planning => "planning",
        }
    }
}

/// 计划步骤状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
}

/// 计划中的单个步骤；dependencies 仅作记录，步骤严格按列表顺序执行
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: u32,
    pub action: String,
    pub status: StepStatus,
    #[serde(default)]
    pub dependencies: Vec<u32>,
}

impl PlanStep {
    pub fn pending(id: u32, action: impl Into<String>, dependencies: Vec<u32>) -> Self {
        Self {
            id,
            action: action.into(),
            status: StepStatus::Pending,
            dependencies,
        }
    }
}

/// 计划：任务描述 + 有序步骤
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub task: String,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(task: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            task: task.into(),
            steps,
        }
    }

    /// 通用三步计划（understand → execute → verify），Planner 无法产出步骤时使用
    pub fn generic(task: impl Into<String>) -> Self {
        Self::new(
            task,
            vec![
                PlanStep::pending(1, "Understand the task", vec![]),
                PlanStep::pending(2, "Execute the task", vec![1]),
                PlanStep::pending(3, "Verify completion", vec![2]),
            ],
        )
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }
}

/// 模型提出的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// 读取字符串参数（不存在或非字符串时为 None）
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }
}

/// 一次工具调用的结果：success 为 false 时 error 必有值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, payload: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// 回写给模型的 tool 消息内容：成功为 payload JSON，失败为 "Error: ..."
    pub fn to_message_content(&self) -> String {
        if self.success {
            let payload = self.payload.as_ref().unwrap_or(&Value::Null);
            serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            )
        }
    }
}

/// 审批状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::None => "none",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

/// 审批请求：仅在 approval_status == Pending 时存在
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub reason: String,
    pub tool_call_id: String,
    pub tool_name: String,
}

/// 校验结果：策略命中项、本轮工具错误与文件落盘核对
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub violations: Vec<String>,
    pub tool_errors: Vec<String>,
    /// 记录为新建但磁盘上不存在的文件
    #[serde(default)]
    pub file_errors: Vec<String>,
    /// 记录为修改但磁盘上不存在的文件
    #[serde(default)]
    pub file_warnings: Vec<String>,
}

impl VerificationResult {
    pub fn files_verified(&self) -> bool {
        self.file_errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.file_errors.len() + self.tool_errors.len()
    }
}

/// 导致本轮失败的终止性原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRequest,
    Oracle,
    MaxIterationsExceeded,
    ApprovalRejected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// 编排状态（检查点单元）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub session_id: String,
    pub request: String,
    pub messages: Vec<Message>,
    pub intent: Option<Intent>,
    pub mode: Option<ExecutionMode>,
    pub plan: Option<Plan>,
    /// 单调不减且不超过 plan.steps 长度
    pub current_step_index: usize,
    /// 本轮待执行的工具调用
    pub tool_calls: Vec<ToolCall>,
    /// 本轮已执行的工具调用记录（供 verify 扫描）
    pub executed_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub created_files: Vec<String>,
    pub modified_files: Vec<String>,
    pub verification: Option<VerificationResult>,
    pub errors: Vec<String>,
    pub requires_approval: bool,
    pub approval_status: ApprovalStatus,
    pub approval_request: Option<ApprovalRequest>,
    /// 本轮 agent 已发起的模型调用次数
    pub iterations: usize,
    /// agent / chat 的最终文本回复
    pub reply: Option<String>,
    pub summary: Option<String>,
    pub failure: Option<TurnFailure>,
}

impl OrchestrationState {
    /// 以会话历史 + 本轮用户请求构建初始状态
    pub fn new(session_id: impl Into<String>, request: impl Into<String>, history: &[Message]) -> Self {
        let request = request.into();
        let mut messages = history.to_vec();
        messages.push(Message::user(request.clone()));
        Self {
            session_id: session_id.into(),
            request,
            messages,
            intent: None,
            mode: None,
            plan: None,
            current_step_index: 0,
            tool_calls: Vec::new(),
            executed_calls: Vec::new(),
            tool_results: Vec::new(),
            created_files: Vec::new(),
            modified_files: Vec::new(),
            verification: None,
            errors: Vec::new(),
            requires_approval: false,
            approval_status: ApprovalStatus::None,
            approval_request: None,
            iterations: 0,
            reply: None,
            summary: None,
            failure: None,
        }
    }

    /// 最近一条用户消息
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.current_step_index = 0;
    }

    /// 当前进行中的计划步骤
    pub fn current_step(&self) -> Option<&PlanStep> {
        self.plan
            .as_ref()
            .and_then(|p| p.steps.get(self.current_step_index))
    }

    /// 将当前步骤标记为完成并前移索引（索引不会越过步骤数）
    pub fn complete_current_step(&mut self) {
        let Some(plan) = self.plan.as_mut() else {
            return;
        };
        if let Some(step) = plan.steps.get_mut(self.current_step_index) {
            step.status = StepStatus::Completed;
            self.current_step_index += 1;
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// 记录终止性失败，同时写入 errors
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        let message = message.into();
        self.errors.push(message.clone());
        self.failure = Some(TurnFailure { kind, message });
    }

    /// 进入待审批：requires_approval 与 Pending 同时成立
    pub fn request_approval(&mut self, request: ApprovalRequest) {
        self.requires_approval = true;
        self.approval_status = ApprovalStatus::Pending;
        self.approval_request = Some(request);
    }

    pub fn is_pending_approval(&self) -> bool {
        self.approval_status == ApprovalStatus::Pending
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// 工具成功数 / 总数
    pub fn tool_success_ratio(&self) -> (usize, usize) {
        let ok = self.tool_results.iter().filter(|r| r.success).count();
        (ok, self.tool_results.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_index_never_passes_plan_length() {
        let mut state = OrchestrationState::new("s1", "refactor the parser", &[]);
        state.set_plan(Plan::generic("refactor the parser"));
        for _ in 0..5 {
            state.complete_current_step();
        }
        assert_eq!(state.current_step_index, 3);
        assert_eq!(state.plan.as_ref().unwrap().completed_count(), 3);
        assert!(state.current_step().is_none());
    }

    #[test]
    fn test_request_approval_sets_pending_invariant() {
        let mut state = OrchestrationState::new("s1", "stop nginx", &[]);
        state.request_approval(ApprovalRequest {
            reason: "Service operation: stop_service on nginx".into(),
            tool_call_id: "c1".into(),
            tool_name: "stop_service".into(),
        });
        assert!(state.requires_approval);
        assert!(state.is_pending_approval());
    }

    #[test]
    fn test_latest_user_message_prefers_newest() {
        let history = vec![Message::user("first"), Message::assistant("reply")];
        let state = OrchestrationState::new("s1", "second", &history);
        assert_eq!(state.latest_user_message(), Some("second"));
    }

    #[test]
    fn test_tool_result_message_content() {
        let call = ToolCall::new("c1", "read_file", serde_json::json!({"file_path": "a.rs"}));
        let failed = ToolResult::failed(&call, "not found");
        assert_eq!(failed.to_message_content(), "Error: not found");
        let ok = ToolResult::ok(&call, serde_json::json!({"content": "fn main() {}"}));
        assert!(ok.to_message_content().contains("fn main"));
    }
}
