//! Shell 执行：run_command 工具与共享的命令运行函数
//!
//! 命令通过 sh -c / cmd /C 在会话工作目录下执行，带超时；命中禁止子串（如 rm -rf /、mkfs）直接拒绝。
//! 这里只挡明显的破坏性命令，需要人工确认的危险操作由 verify 阶段的审批策略处理。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::{Tool, ToolContext};

/// 单个输出流最多保留的字符数
const MAX_OUTPUT_CHARS: usize = 10_000;

/// 一次命令执行的结果
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_OUTPUT_CHARS {
        s.chars().take(MAX_OUTPUT_CHARS).collect::<String>() + "\n...[truncated]"
    } else {
        s.to_string()
    }
}

/// 在 cwd 下执行命令；超时或无法启动时返回 Err，非零退出码不视为 Err
pub async fn run_shell(command: &str, cwd: &Path, timeout_secs: u64) -> Result<CommandOutput, String> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    if cwd.is_dir() {
        cmd.current_dir(cwd);
    }
    cmd.kill_on_drop(true);

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| format!("Command timed out after {}s", timeout_secs))?
        .map_err(|e| format!("Execution failed: {}", e))?;

    Ok(CommandOutput {
        command: command.to_string(),
        stdout: truncate(&String::from_utf8_lossy(&output.stdout)),
        stderr: truncate(&String::from_utf8_lossy(&output.stderr)),
        exit_code: output.status.code(),
    })
}

#[derive(Deserialize, JsonSchema)]
struct RunCommandArgs {
    /// 要执行的 shell 命令
    command: String,
}

/// run_command 工具
pub struct RunCommandTool {
    blocked_patterns: Vec<String>,
    timeout_secs: u64,
}

impl RunCommandTool {
    pub fn new(blocked_patterns: Vec<String>, timeout_secs: u64) -> Self {
        let blocked_patterns = blocked_patterns
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            blocked_patterns,
            timeout_secs,
        }
    }

    fn check(&self, raw: &str) -> Result<(), String> {
        if raw.trim().is_empty() {
            return Err("Empty command".to_string());
        }
        let lower = raw.to_lowercase();
        match self.blocked_patterns.iter().find(|p| lower.contains(p.as_str())) {
            Some(p) => Err(format!("Forbidden pattern: {}", p)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the current directory and return stdout, stderr and the exit code."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<RunCommandArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String> {
        let args: RunCommandArgs = parse_args(args)?;
        let command = args.command.trim();
        self.check(command)?;

        tracing::info!(command = %command, cwd = %ctx.working_directory.display(), "run_command");
        let output = run_shell(command, &ctx.working_directory, self.timeout_secs).await?;
        if !output.success() {
            return Err(format!(
                "Exit {:?}\nstderr: {}",
                output.exit_code,
                output.stderr.trim()
            ));
        }
        serde_json::to_value(&output).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> RunCommandTool {
        RunCommandTool::new(vec!["rm -rf /".into(), "mkfs".into()], 5)
    }

    #[test]
    fn test_blocked_patterns() {
        let t = tool();
        assert!(t.check("rm -rf / --no-preserve-root").is_err());
        assert!(t.check("MKFS.ext4 /dev/sda1").is_err());
        assert!(t.check("   ").is_err());
        assert!(t.check("ls -la").is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_session_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let ctx = ToolContext::new("s1", dir.path());
        let out = tool().execute(json!({"command": "ls"}), &ctx).await.unwrap();
        assert!(out["stdout"].as_str().unwrap().contains("marker.txt"));
        assert_eq!(out["exit_code"], 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let ctx = ToolContext::new("s1", std::env::temp_dir());
        let err = tool().execute(json!({"command": "exit 3"}), &ctx).await.unwrap_err();
        assert!(err.starts_with("Exit Some(3)"));
    }
}
