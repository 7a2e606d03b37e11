//! 确定性计划执行器
//!
//! 顺序执行、遇错即停：第一个失败步骤之后的步骤不会执行，也不出现在报告中。
//! 未注册的函数名作为失败步骤记录，不向上抛错。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::router::ActionStep;
use crate::core::ToolCall;
use crate::tools::{ToolContext, ToolDispatcher};

/// 单步结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub function: String,
    pub success: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 整个计划的执行报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub steps: Vec<StepResult>,
    /// 最后一个已执行步骤的结果
    pub final_result: Option<Value>,
    pub errors: Vec<String>,
}

impl ExecutionReport {
    pub fn successful_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }
}

/// 模板参数 `target` 映射到工具的实际参数名
fn tool_args(function: &str, template: &Map<String, Value>) -> Value {
    let target = template.get("target").cloned();
    match (function, target) {
        ("run_command", Some(t)) => json!({ "command": t }),
        ("list_services", _) => json!({}),
        (_, Some(t)) => json!({ "service_name": t }),
        (_, None) => Value::Object(template.clone()),
    }
}

pub struct PlanExecutor {
    dispatcher: Arc<ToolDispatcher>,
}

impl PlanExecutor {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn execute(&self, plan: &[ActionStep], ctx: &ToolContext) -> ExecutionReport {
        if plan.is_empty() {
            return ExecutionReport {
                success: false,
                steps: Vec::new(),
                final_result: None,
                errors: vec!["Empty action plan".to_string()],
            };
        }

        let mut steps = Vec::with_capacity(plan.len());
        let mut errors = Vec::new();

        for (i, action) in plan.iter().enumerate() {
            tracing::info!(step = %action.step, function = %action.function, "executing plan step");

            let outcome = if self.dispatcher.can_invoke(&action.function) {
                let call = ToolCall::new(
                    format!("step_{}", i + 1),
                    action.function.clone(),
                    tool_args(&action.function, &action.args),
                );
                let result = self.dispatcher.invoke(&call, ctx).await;
                StepResult {
                    step: action.step.clone(),
                    function: action.function.clone(),
                    success: result.success,
                    result: result.payload.unwrap_or(Value::Null),
                    error: result.error,
                }
            } else {
                StepResult {
                    step: action.step.clone(),
                    function: action.function.clone(),
                    success: false,
                    result: Value::Null,
                    error: Some(format!("Unknown function: {}", action.function)),
                }
            };

            let failed = !outcome.success;
            if failed {
                let error = outcome.error.as_deref().unwrap_or("Unknown error");
                errors.push(format!("Step '{}' failed: {}", outcome.step, error));
            }
            steps.push(outcome);
            if failed {
                tracing::warn!(step = %action.step, "plan step failed, stopping");
                break;
            }
        }

        let success = errors.is_empty() && steps.iter().all(|s| s.success);
        let final_result = steps.last().map(|s| s.result.clone());
        ExecutionReport {
            success,
            steps,
            final_result,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;

    struct Named {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, String> {
            if self.fail {
                Err("unit not found".into())
            } else {
                Ok(json!({ "echo": args }))
            }
        }
    }

    fn step(step: &str, function: &str) -> ActionStep {
        let mut args = Map::new();
        args.insert("target".into(), json!("nginx"));
        ActionStep {
            step: step.into(),
            function: function.into(),
            args,
        }
    }

    fn executor(fail_stop: bool) -> PlanExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Named { name: "check_service", fail: false });
        registry.register(Named { name: "stop_service", fail: fail_stop });
        registry.register(Named { name: "start_service", fail: false });
        PlanExecutor::new(Arc::new(ToolDispatcher::new(registry, 5)))
    }

    fn ctx() -> ToolContext {
        ToolContext::new("s1", std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let plan = vec![step("check", "check_service"), step("start", "start_service")];
        let report = executor(false).execute(&plan, &ctx()).await;
        assert!(report.success);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.final_result.unwrap()["echo"]["service_name"], "nginx");
    }

    #[tokio::test]
    async fn test_fail_fast_reports_only_attempted_steps() {
        let plan = vec![
            step("check", "check_service"),
            step("stop", "stop_service"),
            step("start", "start_service"),
            step("verify", "check_service"),
        ];
        let report = executor(true).execute(&plan, &ctx()).await;
        assert!(!report.success);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.errors, vec!["Step 'stop' failed: unit not found"]);
        assert_eq!(report.steps[0].result["echo"]["service_name"], "nginx");
        assert!(report.steps[1].result.is_null());
    }

    #[tokio::test]
    async fn test_unknown_function_is_a_failed_step() {
        let plan = vec![step("frob", "frobnicate"), step("check", "check_service")];
        let report = executor(false).execute(&plan, &ctx()).await;
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].error.as_deref(), Some("Unknown function: frobnicate"));

        let empty = executor(false).execute(&[], &ctx()).await;
        assert!(!empty.success);
        assert_eq!(empty.errors, vec!["Empty action plan"]);
    }
}
