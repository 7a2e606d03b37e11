//! Planner：把复杂任务拆成有序步骤（planning 模式）
//!
//! 调用 LLM 得到纯文本拆解，按行提取以数字、`-`、`*` 开头的条目作为步骤。
//! 提取不到步骤或 LLM 调用失败时回退为通用三步计划，并返回一条非致命的规划错误，保证 agent 总能拿到非空计划。

use std::sync::Arc;

use crate::core::{Plan, PlanStep};
use crate::llm::LlmClient;
use crate::memory::Message;

const PLANNER_SYSTEM_PROMPT: &str = "You are a planning assistant. Break down tasks into clear, executable steps.\n\
Each step should be specific and actionable, and executable on its own when possible.\n\
Return the plan as a numbered list, one step per line.";

/// 规划结果：plan 一定非空；error 为回退原因（非致命）
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub error: Option<String>,
}

/// 从模型输出中提取步骤：数字 / `-` / `*` 开头的行，去掉前缀标记
pub fn parse_plan_steps(text: &str) -> Vec<PlanStep> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            line.chars()
                .next()
                .map(|c| c.is_ascii_digit() || c == '-' || c == '*')
                .unwrap_or(false)
        })
        .map(|line| {
            line.trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | '-' | '*' | ')' | ' '))
                .trim()
        })
        .filter(|desc| !desc.is_empty())
        .enumerate()
        .map(|(i, desc)| PlanStep::pending(i as u32 + 1, desc, Vec::new()))
        .collect()
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: PLANNER_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub async fn plan(&self, task: &str) -> PlanOutcome {
        let messages = [
            Message::system(self.system_prompt.clone()),
            Message::user(format!(
                "Task: {}\n\nCreate a step-by-step plan to accomplish this task.",
                task
            )),
        ];
        match self.llm.complete(&messages).await {
            Ok(text) => {
                let steps = parse_plan_steps(&text);
                if steps.is_empty() {
                    tracing::warn!("planner produced no steps, using generic plan");
                    PlanOutcome {
                        plan: Plan::generic(task),
                        error: Some("Planning error: no steps could be extracted from the plan".into()),
                    }
                } else {
                    tracing::info!(steps = steps.len(), "plan created");
                    PlanOutcome {
                        plan: Plan::new(task, steps),
                        error: None,
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "planner call failed, using generic plan");
                PlanOutcome {
                    plan: Plan::generic(task),
                    error: Some(format!("Planning error: {}", e)),
                }
            }
        }
    }
}
