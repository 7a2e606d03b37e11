//! 确定性计划路由：封闭动作集合 → 固定步骤模板
//!
//! 模板中的占位参数 `target` 替换为解析出的目标；需要目标却没有时返回空计划。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::parser::{ActionKind, ParsedIntent};

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// 步骤名（check / stop / start / verify / execute / list）
    pub step: String,
    /// 要调用的工具名
    pub function: String,
    pub args: Map<String, Value>,
}

struct StepTemplate {
    step: &'static str,
    function: &'static str,
    /// 是否带 target 参数
    takes_target: bool,
}

const fn step(step: &'static str, function: &'static str, takes_target: bool) -> StepTemplate {
    StepTemplate {
        step,
        function,
        takes_target,
    }
}

fn template(action: ActionKind) -> &'static [StepTemplate] {
    const RESTART: &[StepTemplate] = &[
        step("check", "check_service", true),
        step("stop", "stop_service", true),
        step("start", "start_service", true),
        step("verify", "check_service", true),
    ];
    const START: &[StepTemplate] = &[
        step("check", "check_service", true),
        step("start", "start_service", true),
        step("verify", "check_service", true),
    ];
    const STOP: &[StepTemplate] = &[
        step("check", "check_service", true),
        step("stop", "stop_service", true),
        step("verify", "check_service", true),
    ];
    const CHECK: &[StepTemplate] = &[step("check", "check_service", true)];
    const RUN: &[StepTemplate] = &[step("execute", "run_command", true)];
    const LIST: &[StepTemplate] = &[step("list", "list_services", false)];

    match action {
        ActionKind::RestartService => RESTART,
        ActionKind::StartService => START,
        ActionKind::StopService => STOP,
        ActionKind::CheckService => CHECK,
        ActionKind::RunCommand => RUN,
        ActionKind::ListServices => LIST,
        ActionKind::Unknown => &[],
    }
}

#[derive(Debug, Default, Clone)]
pub struct PlanRouter;

impl PlanRouter {
    pub fn new() -> Self {
        Self
    }

    /// 生成步骤列表；未知动作或缺少目标时为空
    pub fn route(&self, intent: &ParsedIntent) -> Vec<ActionStep> {
        let steps = template(intent.action);
        let needs_target = steps.iter().any(|s| s.takes_target);
        if needs_target && intent.target.is_none() {
            tracing::warn!(action = intent.action.as_str(), "no target parsed, plan is empty");
            return Vec::new();
        }

        steps
            .iter()
            .map(|t| {
                let mut args = Map::new();
                if t.takes_target {
                    if let Some(target) = &intent.target {
                        args.insert("target".to_string(), Value::String(target.clone()));
                    }
                }
                ActionStep {
                    step: t.step.to_string(),
                    function: t.function.to_string(),
                    args,
                }
            })
            .collect()
    }

    pub fn supported_actions(&self) -> Vec<&'static str> {
        ActionKind::SUPPORTED.iter().map(|a| a.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(action: ActionKind, target: Option<&str>) -> ParsedIntent {
        ParsedIntent {
            action,
            target: target.map(str::to_string),
            original_request: String::new(),
            confidence: 1.0,
        }
    }

    #[test]
    fn test_restart_template_order() {
        let plan = PlanRouter::new().route(&intent(ActionKind::RestartService, Some("nginx")));
        let steps: Vec<_> = plan.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(steps, vec!["check", "stop", "start", "verify"]);
        assert!(plan.iter().all(|s| s.args["target"] == "nginx"));
    }

    #[test]
    fn test_every_supported_action_routes_non_empty() {
        let router = PlanRouter::new();
        for action in ActionKind::SUPPORTED {
            let plan = router.route(&intent(action, Some("redis")));
            assert!(!plan.is_empty(), "{:?}", action);
            for s in &plan {
                if s.function != "list_services" {
                    assert_eq!(s.args["target"], "redis");
                }
            }
        }
    }

    #[test]
    fn test_unknown_and_missing_target_give_empty_plan() {
        let router = PlanRouter::new();
        assert!(router.route(&intent(ActionKind::Unknown, Some("x"))).is_empty());
        assert!(router.route(&intent(ActionKind::StopService, None)).is_empty());
        assert_eq!(router.route(&intent(ActionKind::ListServices, None)).len(), 1);
    }
}
