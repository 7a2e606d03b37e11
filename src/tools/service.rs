//! 服务管理工具：check / start / stop / restart / list_services（action 能力组）
//!
//! 具体的服务后端由 ServiceManager trait 抽象，默认实现走 systemctl（Linux）、launchctl（macOS），
//! 其它平台退化为 pgrep / service 命令。服务名只允许 [A-Za-z0-9@._-]，避免拼接进 shell 时被注入。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::shell::run_shell;
use crate::tools::{Tool, ToolContext};

/// 服务状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service_name: String,
    pub is_running: bool,
    /// running / stopped
    pub status: String,
    #[serde(default)]
    pub details: String,
}

impl ServiceStatus {
    pub fn new(service_name: &str, is_running: bool, details: impl Into<String>) -> Self {
        Self {
            service_name: service_name.to_string(),
            is_running,
            status: if is_running { "running" } else { "stopped" }.to_string(),
            details: details.into(),
        }
    }
}

/// 服务后端
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn check(&self, name: &str) -> Result<ServiceStatus, String>;

    async fn start(&self, name: &str) -> Result<String, String>;

    async fn stop(&self, name: &str) -> Result<String, String>;

    /// 正在运行的服务列表（原始输出）
    async fn list(&self) -> Result<String, String>;
}

pub fn validate_service_name(name: &str) -> Result<&str, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Missing service_name".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '-'))
    {
        return Err(format!("Invalid service name: {}", name));
    }
    Ok(name)
}

/// 基于系统命令的服务后端
pub struct SystemServiceManager {
    timeout_secs: u64,
    cwd: PathBuf,
}

impl SystemServiceManager {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            cwd: std::env::temp_dir(),
        }
    }

    async fn run(&self, command: &str) -> Result<crate::tools::shell::CommandOutput, String> {
        run_shell(command, &self.cwd, self.timeout_secs).await
    }

    async fn run_checked(&self, command: &str) -> Result<String, String> {
        let out = self.run(command).await?;
        if out.success() {
            Ok(out.stdout.trim().to_string())
        } else {
            Err(if out.stderr.trim().is_empty() {
                format!("`{}` exited with {:?}", command, out.exit_code)
            } else {
                out.stderr.trim().to_string()
            })
        }
    }
}

fn first_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[async_trait]
impl ServiceManager for SystemServiceManager {
    async fn check(&self, name: &str) -> Result<ServiceStatus, String> {
        if cfg!(target_os = "linux") {
            let active = self.run(&format!("systemctl is-active {}", name)).await?;
            let is_running = active.stdout.trim() == "active";
            let details = self.run(&format!("systemctl status {} --no-pager", name)).await?;
            Ok(ServiceStatus::new(name, is_running, first_chars(&details.stdout, 500)))
        } else if cfg!(target_os = "macos") {
            let out = self.run(&format!("launchctl list | grep {}", name)).await?;
            let is_running = out.success() && out.stdout.contains(name);
            Ok(ServiceStatus::new(name, is_running, first_chars(&out.stdout, 500)))
        } else {
            let out = self.run(&format!("pgrep -f {}", name)).await?;
            Ok(ServiceStatus::new(name, out.success(), out.stdout))
        }
    }

    async fn start(&self, name: &str) -> Result<String, String> {
        if cfg!(target_os = "linux") {
            self.run_checked(&format!("systemctl start {}", name)).await
        } else if cfg!(target_os = "macos") {
            self.run_checked(&format!("launchctl load -w /Library/LaunchDaemons/{}.plist", name))
                .await
        } else {
            self.run_checked(&format!("service {} start", name)).await
        }
    }

    async fn stop(&self, name: &str) -> Result<String, String> {
        if cfg!(target_os = "linux") {
            self.run_checked(&format!("systemctl stop {}", name)).await
        } else if cfg!(target_os = "macos") {
            self.run_checked(&format!("launchctl unload -w /Library/LaunchDaemons/{}.plist", name))
                .await
        } else {
            self.run_checked(&format!("service {} stop", name)).await
        }
    }

    async fn list(&self) -> Result<String, String> {
        let out = self
            .run("systemctl list-units --type=service --state=running --no-pager 2>/dev/null || ps aux | head -20")
            .await?;
        Ok(out.stdout)
    }
}

/// 服务操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOp {
    Check,
    Start,
    Stop,
    Restart,
    List,
}

impl ServiceOp {
    pub const ALL: [ServiceOp; 5] = [
        ServiceOp::Check,
        ServiceOp::Start,
        ServiceOp::Stop,
        ServiceOp::Restart,
        ServiceOp::List,
    ];

    pub fn tool_name(&self) -> &'static str {
        match self {
            ServiceOp::Check => "check_service",
            ServiceOp::Start => "start_service",
            ServiceOp::Stop => "stop_service",
            ServiceOp::Restart => "restart_service",
            ServiceOp::List => "list_services",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ServiceOp::Check => "Check whether a system service is running and return its status.",
            ServiceOp::Start => "Start a system service.",
            ServiceOp::Stop => "Stop a system service.",
            ServiceOp::Restart => "Restart a system service (stop, start, then verify it is running).",
            ServiceOp::List => "List running system services.",
        }
    }
}

#[derive(Deserialize, JsonSchema)]
struct ServiceArgs {
    /// 服务名，如 nginx
    service_name: String,
}

/// 服务工具：一个 ServiceOp 对应一个工具名
pub struct ServiceTool {
    op: ServiceOp,
    manager: Arc<dyn ServiceManager>,
}

impl ServiceTool {
    pub fn new(op: ServiceOp, manager: Arc<dyn ServiceManager>) -> Self {
        Self { op, manager }
    }

    async fn restart(&self, name: &str) -> Result<Value, String> {
        let before = self.manager.check(name).await?;
        if let Err(e) = self.manager.stop(name).await {
            if before.is_running {
                return Err(format!("Failed to stop service: {}", e));
            }
            tracing::warn!(service = %name, error = %e, "stop failed on a stopped service, starting anyway");
        }
        let output = self.manager.start(name).await?;
        let after = self.manager.check(name).await?;
        if !after.is_running {
            return Err(format!("Service {} is not running after restart", name));
        }
        Ok(json!({
            "service_name": name,
            "action": "restart",
            "status_before": before.status,
            "status_after": after.status,
            "output": output,
        }))
    }
}

#[async_trait]
impl Tool for ServiceTool {
    fn name(&self) -> &str {
        self.op.tool_name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn parameters_schema(&self) -> Value {
        match self.op {
            ServiceOp::List => json!({ "type": "object", "properties": {}, "required": [] }),
            _ => parameters_for::<ServiceArgs>(),
        }
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        tracing::info!(op = self.op.tool_name(), args = %args, "service tool");
        match self.op {
            ServiceOp::List => {
                let output = self.manager.list().await?;
                Ok(json!({ "output": output }))
            }
            ServiceOp::Check => {
                let name = service_arg(args)?;
                let status = self.manager.check(&name).await?;
                serde_json::to_value(status).map_err(|e| e.to_string())
            }
            ServiceOp::Start => {
                let name = service_arg(args)?;
                let output = self.manager.start(&name).await?;
                Ok(json!({ "service_name": name, "action": "start", "output": output }))
            }
            ServiceOp::Stop => {
                let name = service_arg(args)?;
                let output = self.manager.stop(&name).await?;
                Ok(json!({ "service_name": name, "action": "stop", "output": output }))
            }
            ServiceOp::Restart => {
                let name = service_arg(args)?;
                self.restart(&name).await
            }
        }
    }
}

fn service_arg(args: Value) -> Result<String, String> {
    let args: ServiceArgs = parse_args(args)?;
    validate_service_name(&args.service_name).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 内存服务后端：stop/start 改变运行状态
    struct FakeServices {
        running: Mutex<bool>,
        fail_start: bool,
    }

    #[async_trait]
    impl ServiceManager for FakeServices {
        async fn check(&self, name: &str) -> Result<ServiceStatus, String> {
            Ok(ServiceStatus::new(name, *self.running.lock().unwrap(), ""))
        }
        async fn start(&self, _name: &str) -> Result<String, String> {
            if self.fail_start {
                return Err("unit not found".into());
            }
            *self.running.lock().unwrap() = true;
            Ok(String::new())
        }
        async fn stop(&self, _name: &str) -> Result<String, String> {
            *self.running.lock().unwrap() = false;
            Ok(String::new())
        }
        async fn list(&self) -> Result<String, String> {
            Ok("nginx.service".into())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("s1", std::env::temp_dir())
    }

    #[test]
    fn test_service_name_validation() {
        assert!(validate_service_name("nginx").is_ok());
        assert!(validate_service_name("getty@tty1.service").is_ok());
        assert!(validate_service_name("nginx; rm -rf /").is_err());
        assert!(validate_service_name("  ").is_err());
    }

    #[tokio::test]
    async fn test_restart_reports_before_and_after() {
        let manager = Arc::new(FakeServices {
            running: Mutex::new(true),
            fail_start: false,
        });
        let tool = ServiceTool::new(ServiceOp::Restart, manager);
        let out = tool
            .execute(json!({"service_name": "nginx"}), &ctx())
            .await
            .unwrap();
        assert_eq!(out["status_before"], "running");
        assert_eq!(out["status_after"], "running");
    }

    #[tokio::test]
    async fn test_start_failure_propagates() {
        let manager = Arc::new(FakeServices {
            running: Mutex::new(false),
            fail_start: true,
        });
        let tool = ServiceTool::new(ServiceOp::Start, manager.clone());
        let err = tool
            .execute(json!({"service_name": "nginx"}), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err, "unit not found");

        let list = ServiceTool::new(ServiceOp::List, manager);
        let out = list.execute(json!({}), &ctx()).await.unwrap();
        assert_eq!(out["output"], "nginx.service");
    }
}
