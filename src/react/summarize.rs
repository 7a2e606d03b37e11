//! summarize 节点：由最终状态生成面向用户的报告（纯函数）

use crate::core::OrchestrationState;

fn file_section(lines: &mut Vec<String>, verb: &str, files: &[String]) {
    if files.is_empty() {
        return;
    }
    lines.push(format!("{} {} file(s):", verb, files.len()));
    lines.extend(files.iter().map(|f| format!("  - {}", f)));
}

/// 报告：新建/修改的文件、工具成功率、前 max_errors 条错误、文件核对、计划完成度；都没有时为 "Task completed"
pub fn summarize(state: &OrchestrationState, max_errors: usize) -> String {
    let mut lines = Vec::new();

    file_section(&mut lines, "Created", &state.created_files);
    file_section(&mut lines, "Modified", &state.modified_files);

    let (ok, total) = state.tool_success_ratio();
    if total > 0 {
        lines.push(format!("Executed {}/{} tool(s) successfully", ok, total));
    }

    if !state.errors.is_empty() {
        lines.push("Errors encountered:".to_string());
        lines.extend(
            state
                .errors
                .iter()
                .take(max_errors)
                .map(|e| format!("  - {}", e)),
        );
        if state.errors.len() > max_errors {
            lines.push(format!("  ... and {} more", state.errors.len() - max_errors));
        }
    }

    if let Some(verification) = &state.verification {
        let tracked = !state.created_files.is_empty() || !state.modified_files.is_empty();
        if tracked && verification.files_verified() {
            lines.push("✅ All files verified successfully".to_string());
        }
        if verification.error_count() > 0 {
            lines.push(format!("⚠ Verification errors: {}", verification.error_count()));
        }
    }

    if let Some(plan) = state.plan.as_ref().filter(|p| !p.is_empty()) {
        lines.push(format!(
            "Plan progress: {}/{} steps completed",
            plan.completed_count(),
            plan.len()
        ));
    }

    if lines.is_empty() {
        "Task completed".to_string()
    } else {
        lines.join("\n")
    }
}
