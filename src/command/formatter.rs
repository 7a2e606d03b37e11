//! 确定性路径的结果格式化：ExecutionReport → 面向用户的一段文字

use serde_json::Value;

use super::executor::ExecutionReport;
use super::parser::ActionKind;

/// run_command 输出最多展示的字符数
const OUTPUT_PREVIEW_CHARS: usize = 200;

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn preview(output: &str) -> String {
    if output.chars().count() > OUTPUT_PREVIEW_CHARS {
        format!("{}...", output.chars().take(OUTPUT_PREVIEW_CHARS).collect::<String>())
    } else {
        output.to_string()
    }
}

pub fn format_report(action: ActionKind, report: &ExecutionReport) -> String {
    if !report.success {
        if report.errors.is_empty() {
            return "✗ Operation failed".to_string();
        }
        let errors: Vec<&str> = report.errors.iter().take(3).map(String::as_str).collect();
        return format!("✗ Error: {}", errors.join("; "));
    }

    let null = Value::Null;
    let final_result = report.final_result.as_ref().unwrap_or(&null);

    match report.steps.as_slice() {
        [] => "No actions were executed.".to_string(),
        [only] => format_single(&only.function, final_result),
        steps => {
            let total = steps.len();
            let ok = report.successful_steps();
            match str_field(final_result, "service_name") {
                Some(name) => {
                    let status = str_field(final_result, "status_after")
                        .or_else(|| str_field(final_result, "status"));
                    match status {
                        Some(status) => format!(
                            "✓ Service '{}' {} completed. Final status: {} ({}/{} steps successful)",
                            name,
                            action.verb(),
                            status,
                            ok,
                            total
                        ),
                        None => format!(
                            "✓ Service '{}' {} completed ({}/{} steps successful)",
                            name,
                            action.verb(),
                            ok,
                            total
                        ),
                    }
                }
                None => format!("✓ Operation completed successfully ({}/{} steps successful)", ok, total),
            }
        }
    }
}

fn format_single(function: &str, result: &Value) -> String {
    let name = str_field(result, "service_name").unwrap_or("unknown");
    match function {
        "check_service" => {
            let running = result.get("is_running").and_then(Value::as_bool).unwrap_or(false);
            let status = str_field(result, "status").unwrap_or("unknown");
            format!(
                "{} Service '{}' status: {}",
                if running { "✓" } else { "✗" },
                name,
                status
            )
        }
        "run_command" => {
            let output = str_field(result, "stdout")
                .or_else(|| str_field(result, "output"))
                .unwrap_or("");
            format!("✓ Command executed successfully.\nOutput:\n{}", preview(output.trim_end()))
        }
        "start_service" | "stop_service" | "restart_service" => {
            let action = str_field(result, "action").unwrap_or("operation");
            format!("✓ Service '{}' {} completed successfully", name, action)
        }
        "list_services" => {
            let output = str_field(result, "output").unwrap_or("");
            format!("✓ Running services:\n{}", output.trim_end())
        }
        _ => "✓ Operation completed successfully".to_string(),
    }
}

pub fn format_unknown(request: &str) -> String {
    format!(
        "❓ I don't understand the request: '{}'. Please try a different format.",
        request
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::executor::StepResult;
    use serde_json::json;

    fn step(function: &str, result: Value) -> StepResult {
        StepResult {
            step: "s".into(),
            function: function.into(),
            success: true,
            result,
            error: None,
        }
    }

    fn report(steps: Vec<StepResult>) -> ExecutionReport {
        ExecutionReport {
            success: true,
            final_result: steps.last().map(|s| s.result.clone()),
            steps,
            errors: vec![],
        }
    }

    #[test]
    fn test_errors_show_first_three() {
        let r = ExecutionReport {
            success: false,
            steps: vec![],
            final_result: None,
            errors: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        };
        assert_eq!(format_report(ActionKind::RunCommand, &r), "✗ Error: a; b; c");
    }

    #[test]
    fn test_single_step_messages() {
        let check = report(vec![step(
            "check_service",
            json!({"service_name": "nginx", "is_running": true, "status": "running"}),
        )]);
        assert_eq!(
            format_report(ActionKind::CheckService, &check),
            "✓ Service 'nginx' status: running"
        );

        let run = report(vec![step("run_command", json!({"stdout": "hello\n"}))]);
        assert_eq!(
            format_report(ActionKind::RunCommand, &run),
            "✓ Command executed successfully.\nOutput:\nhello"
        );
    }

    #[test]
    fn test_multi_step_service_summary() {
        let r = report(vec![
            step("check_service", json!({"service_name": "nginx", "status": "running"})),
            step("stop_service", json!({"service_name": "nginx", "action": "stop"})),
            step("start_service", json!({"service_name": "nginx", "action": "start"})),
            step("check_service", json!({"service_name": "nginx", "status": "running"})),
        ]);
        assert_eq!(
            format_report(ActionKind::RestartService, &r),
            "✓ Service 'nginx' restart completed. Final status: running (4/4 steps successful)"
        );
    }

    #[test]
    fn test_unknown_request() {
        assert!(format_unknown("make coffee").starts_with("❓ I don't understand the request: 'make coffee'"));
    }
}
