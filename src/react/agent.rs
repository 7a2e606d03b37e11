//! agent 节点：一次 ReAct 推理
//!
//! 拼接 system prompt（能力说明 + 当前计划步骤 + 会话上下文）与本轮消息历史，带完整工具目录调用 LLM。
//! 模型给出纯文本即为最终回复；否则返回待执行的工具调用（缺失 id 的调用补一个 call_ 前缀的 uuid）。

use crate::core::{OrchestrationState, ToolCall};
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;
use crate::tools::ToolSpec;

pub const AGENT_SYSTEM_PROMPT: &str = "You are a helpful coding and operations assistant that can execute system commands, manage services, and work with files on a computer.

You have access to tools that allow you to:
- Run shell commands
- Check, start, stop, and restart system services
- Get system information
- Read files (with code structure analysis for source files)
- Write files and list directory contents
- Search the web and fetch pages
- Navigate directories

When users reference \"it\" or \"that file\", they mean the last file shown to them.
Use the context below to resolve ambiguous requests. Use the tools to act, then answer
clearly based on the tool results. If a tool call fails, explain why and suggest alternatives.";

/// 一次推理的产出
#[derive(Debug, Clone, PartialEq)]
pub enum AgentTurn {
    /// 最终文本回复
    Reply(String),
    /// 需要执行的工具调用（至少一个）
    ToolCalls {
        content: String,
        calls: Vec<ToolCall>,
    },
}

/// 计划进度段落：当前步骤 + 全部步骤列表
pub fn plan_section(state: &OrchestrationState) -> Option<String> {
    let plan = state.plan.as_ref()?;
    let mut out = format!("\n\nPLAN ({} steps):", plan.len());
    for (idx, step) in plan.steps.iter().enumerate() {
        let marker = if idx == state.current_step_index { "->" } else { "  " };
        out.push_str(&format!("\n{} {}. {}", marker, step.id, step.action));
    }
    if let Some(step) = state.current_step() {
        out.push_str(&format!(
            "\nCurrent step {}/{}: {}",
            state.current_step_index + 1,
            plan.len(),
            step.action
        ));
    }
    Some(out)
}

/// 组装发给模型的消息：system（能力 + 计划 + 上下文）+ 本轮历史
pub fn build_messages(system_prompt: &str, state: &OrchestrationState, session_context: &str) -> Vec<Message> {
    let mut system = system_prompt.to_string();
    if let Some(plan) = plan_section(state) {
        system.push_str(&plan);
    }
    if !session_context.is_empty() {
        system.push_str("\n\n");
        system.push_str(session_context);
    }
    let mut messages = Vec::with_capacity(state.messages.len() + 1);
    messages.push(Message::system(system));
    messages.extend(state.messages.iter().cloned());
    messages
}

/// 推理一步
pub async fn think(
    llm: &dyn LlmClient,
    system_prompt: &str,
    state: &OrchestrationState,
    session_context: &str,
    catalog: &[ToolSpec],
) -> Result<AgentTurn, LlmError> {
    let messages = build_messages(system_prompt, state, session_context);
    let reply = llm.infer(&messages, catalog).await?;
    let content = reply.content.unwrap_or_default();
    if reply.tool_calls.is_empty() {
        return Ok(AgentTurn::Reply(content));
    }
    let calls = reply
        .tool_calls
        .into_iter()
        .map(|mut c| {
            if c.id.trim().is_empty() {
                c.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
            c
        })
        .collect();
    Ok(AgentTurn::ToolCalls { content, calls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Plan;
    use crate::llm::{LlmReply, ScriptedLlmClient};
    use serde_json::json;

    #[test]
    fn test_build_messages_injects_plan_and_context() {
        let mut state = OrchestrationState::new("s1", "migrate config", &[]);
        state.set_plan(Plan::generic("migrate config"));
        state.complete_current_step();
        let messages = build_messages("SYS", &state, "Context:\n- Current directory: /srv");
        assert_eq!(messages.len(), 2);
        let system = &messages[0].content;
        assert!(system.starts_with("SYS"));
        assert!(system.contains("Current step 2/3: Execute the task"));
        assert!(system.contains("Current directory: /srv"));
        assert_eq!(messages[1].content, "migrate config");
    }

    #[tokio::test]
    async fn test_think_fills_missing_call_ids() {
        let llm = ScriptedLlmClient::new(vec![Ok(LlmReply::tool_calls(vec![ToolCall::new(
            "",
            "list_files",
            json!({}),
        )]))]);
        let state = OrchestrationState::new("s1", "list files", &[]);
        let turn = think(&llm, AGENT_SYSTEM_PROMPT, &state, "", &[]).await.unwrap();
        match turn {
            AgentTurn::ToolCalls { calls, .. } => assert!(calls[0].id.starts_with("call_")),
            other => panic!("expected tool calls, got {other:?}"),
        }
    }
}
