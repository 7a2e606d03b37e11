//! verify 节点：执行后的审批策略扫描
//!
//! 只看本轮已执行的工具调用记录（executed_calls），按静态签名表判断是否需要人工审批：
//! - run_command 的命令中含破坏性片段（rm -rf、mkfs ...）
//! - write_file 的目标路径（按会话目录解析并折叠 `..` 后）落在受保护前缀下（/etc/、/usr/ ...）
//! - 任何服务控制调用（start/stop/restart_service，或 run_command 中的 systemctl/service/launchctl 启停）
//!
//! 这是最终确认前的闸门，不是沙箱：命中时操作已经执行过。
//! 另外核对本轮新建/修改的文件是否真实存在于磁盘。

use std::path::Path;

use regex::Regex;
use serde_json::Value;

use crate::config::PolicySection;
use crate::core::{ApprovalRequest, OrchestrationState, ToolCall, VerificationResult};
use crate::tools::registry::normalize_lexically;
use crate::tools::ToolContext;

const PATH_KEYS: [&str; 2] = ["file_path", "path"];

/// 写入 executed_calls 前调用：把 write_file 的目标路径替换为工具实际写入的绝对路径
pub fn record_resolved_paths(mut call: ToolCall, ctx: &ToolContext) -> ToolCall {
    if call.name != "write_file" {
        return call;
    }
    for key in PATH_KEYS {
        let resolved = call
            .str_arg(key)
            .map(|raw| ctx.resolve(raw).display().to_string());
        if let (Some(resolved), Some(args)) = (resolved, call.args.as_object_mut()) {
            args.insert(key.to_string(), Value::String(resolved));
        }
    }
    call
}

/// 一次策略命中
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyViolation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub reason: String,
}

impl PolicyViolation {
    pub fn to_request(&self) -> ApprovalRequest {
        ApprovalRequest {
            reason: self.reason.clone(),
            tool_call_id: self.tool_call_id.clone(),
            tool_name: self.tool_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyGate {
    protected_paths: Vec<String>,
    dangerous_patterns: Vec<String>,
    service_control_tools: Vec<String>,
    service_command: Option<Regex>,
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self::from_config(&PolicySection::default())
    }
}

impl PolicyGate {
    pub fn from_config(cfg: &PolicySection) -> Self {
        Self {
            protected_paths: cfg.protected_paths.clone(),
            dangerous_patterns: cfg
                .dangerous_command_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            service_control_tools: cfg.service_control_tools.clone(),
            service_command: compile_service_pattern(&cfg.service_command_pattern),
        }
    }

    fn check_call(&self, call: &ToolCall) -> Option<String> {
        if self.service_control_tools.iter().any(|t| t == &call.name) {
            let target = call.str_arg("service_name").unwrap_or("(unspecified)");
            return Some(format!("Service operation: {} on {}", call.name, target));
        }
        match call.name.as_str() {
            "run_command" => {
                let command = call.str_arg("command")?.to_lowercase();
                if let Some(p) = self
                    .dangerous_patterns
                    .iter()
                    .find(|p| command.contains(p.as_str()))
                {
                    return Some(format!("Dangerous operation detected: '{}' in command", p.trim()));
                }
                self.service_command
                    .as_ref()
                    .filter(|re| re.is_match(&command))
                    .map(|_| format!("Service operation via command: {}", command.trim()))
            }
            "write_file" => {
                let raw = PATH_KEYS.iter().find_map(|k| call.str_arg(k))?;
                let path = normalize_lexically(Path::new(raw));
                self.protected_paths
                    .iter()
                    .find(|prefix| {
                        let prefix = prefix.trim_end_matches('/');
                        !prefix.is_empty() && path.starts_with(prefix)
                    })
                    .map(|prefix| format!("Write to protected path {} ({})", path.display(), prefix))
            }
            _ => None,
        }
    }

    /// 扫描本轮已执行的调用
    pub fn scan(&self, executed: &[ToolCall]) -> Vec<PolicyViolation> {
        executed
            .iter()
            .filter_map(|call| {
                self.check_call(call).map(|reason| PolicyViolation {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    reason,
                })
            })
            .collect()
    }

    /// 汇总校验结果：策略命中、失败的工具调用、文件落盘核对
    pub fn evaluate(&self, state: &OrchestrationState) -> (VerificationResult, Vec<PolicyViolation>) {
        let violations = self.scan(&state.executed_calls);
        let tool_errors = state
            .tool_results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                format!(
                    "{}: {}",
                    r.tool_name,
                    r.error.as_deref().unwrap_or("Unknown error")
                )
            })
            .collect();
        let file_errors = missing(&state.created_files)
            .map(|f| format!("Created file does not exist: {}", f))
            .collect();
        let file_warnings = missing(&state.modified_files)
            .map(|f| format!("Modified file does not exist: {}", f))
            .collect();
        let verification = VerificationResult {
            violations: violations.iter().map(|v| v.reason.clone()).collect(),
            tool_errors,
            file_errors,
            file_warnings,
        };
        (verification, violations)
    }
}

fn missing(files: &[String]) -> impl Iterator<Item = &String> {
    files.iter().filter(|f| !Path::new(f.as_str()).exists())
}

fn compile_service_pattern(pattern: &str) -> Option<Regex> {
    if pattern.trim().is_empty() {
        return None;
    }
    match Regex::new(&format!("(?i){}", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern = %pattern, error = %e, "invalid service command pattern, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolResult;
    use serde_json::json;

    fn gate() -> PolicyGate {
        PolicyGate::default()
    }

    #[test]
    fn test_destructive_command_requires_approval() {
        let calls = vec![
            ToolCall::new("c1", "run_command", json!({"command": "ls -la"})),
            ToolCall::new("c2", "run_command", json!({"command": "rm -rf /"})),
        ];
        let violations = gate().scan(&calls);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].tool_call_id, "c2");
        assert!(violations[0].reason.contains("rm -rf"));
    }

    #[test]
    fn test_protected_path_write_requires_approval() {
        let calls = vec![
            ToolCall::new("c1", "write_file", json!({"file_path": "/etc/nginx/nginx.conf", "content": ""})),
            ToolCall::new("c2", "write_file", json!({"file_path": "src/main.rs", "content": ""})),
        ];
        let violations = gate().scan(&calls);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].tool_name, "write_file");
    }

    #[test]
    fn test_every_service_control_call_requires_approval() {
        let calls = vec![
            ToolCall::new("c1", "check_service", json!({"service_name": "nginx"})),
            ToolCall::new("c2", "restart_service", json!({"service_name": "nginx"})),
        ];
        let violations = gate().scan(&calls);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].reason, "Service operation: restart_service on nginx");
    }

    #[test]
    fn test_evaluate_collects_tool_errors() {
        let call = ToolCall::new("c1", "read_file", json!({"file_path": "x"}));
        let mut state = OrchestrationState::new("s1", "read x", &[]);
        state.tool_results.push(ToolResult::failed(&call, "File not found: x"));
        state.executed_calls.push(call);
        let (verification, violations) = gate().evaluate(&state);
        assert!(violations.is_empty());
        assert_eq!(verification.tool_errors, vec!["read_file: File not found: x"]);
        assert!(verification.files_verified());
    }

    #[test]
    fn test_dot_segments_cannot_escape_protected_prefix() {
        let calls = vec![
            ToolCall::new("c1", "write_file", json!({"file_path": "/tmp/../etc/cron.d/job", "content": ""})),
            ToolCall::new("c2", "write_file", json!({"file_path": "/tmp/./etc/job", "content": ""})),
        ];
        let violations = gate().scan(&calls);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].tool_call_id, "c1");
        assert!(violations[0].reason.contains("/etc/cron.d/job"));
    }

    #[test]
    fn test_relative_write_is_recorded_against_session_directory() {
        let ctx = ToolContext::new("s1", "/etc");
        let call = ToolCall::new("c1", "write_file", json!({"file_path": "passwd", "content": "x"}));
        let recorded = record_resolved_paths(call, &ctx);
        assert_eq!(recorded.str_arg("file_path"), Some("/etc/passwd"));
        assert_eq!(recorded.str_arg("content"), Some("x"));
        assert_eq!(gate().scan(&[recorded]).len(), 1);

        let other = ToolCall::new("c2", "read_file", json!({"file_path": "passwd"}));
        assert_eq!(record_resolved_paths(other, &ctx).str_arg("file_path"), Some("passwd"));
    }

    #[test]
    fn test_service_control_through_shell_requires_approval() {
        let calls = vec![
            ToolCall::new("c1", "run_command", json!({"command": "systemctl restart nginx"})),
            ToolCall::new("c2", "run_command", json!({"command": "sudo service nginx stop"})),
            ToolCall::new("c3", "run_command", json!({"command": "launchctl unload ~/Library/LaunchAgents/x.plist"})),
            ToolCall::new("c4", "run_command", json!({"command": "systemctl status nginx"})),
            ToolCall::new("c5", "run_command", json!({"command": "cargo test"})),
        ];
        let violations = gate().scan(&calls);
        let ids: Vec<&str> = violations.iter().map(|v| v.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert!(violations[0].reason.starts_with("Service operation via command"));
    }

    #[test]
    fn test_missing_written_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("kept.rs");
        std::fs::write(&present, "fn main() {}").unwrap();
        let gone = dir.path().join("gone.rs").display().to_string();

        let mut state = OrchestrationState::new("s1", "write files", &[]);
        state.created_files = vec![present.display().to_string(), gone.clone()];
        state.modified_files = vec![dir.path().join("old.rs").display().to_string()];

        let (verification, _) = gate().evaluate(&state);
        assert_eq!(verification.file_errors, vec![format!("Created file does not exist: {}", gone)]);
        assert_eq!(verification.file_warnings.len(), 1);
        assert!(!verification.files_verified());
        assert_eq!(verification.error_count(), 1);
    }
}
