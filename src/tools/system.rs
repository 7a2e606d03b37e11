//! 系统信息与工作目录工具：get_system_info / change_directory / get_current_directory
//!
//! change_directory 只校验并返回新目录，真正更新会话工作目录由编排层根据结果完成。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::{Tool, ToolContext};

pub struct SystemInfoTool;

#[async_trait]
impl Tool for SystemInfoTool {
    fn name(&self) -> &str {
        "get_system_info"
    }

    fn description(&self) -> &str {
        "Return basic information about the host system (OS, architecture, hostname, CPU count)."
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        let hostname = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_default();
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Ok(json!({
            "system": std::env::consts::OS,
            "family": std::env::consts::FAMILY,
            "machine": std::env::consts::ARCH,
            "hostname": hostname,
            "cpus": cpus,
        }))
    }
}

#[derive(Deserialize, JsonSchema)]
struct ChangeDirectoryArgs {
    /// 目标目录（绝对路径或相对当前目录）
    path: String,
}

pub struct ChangeDirectoryTool;

#[async_trait]
impl Tool for ChangeDirectoryTool {
    fn name(&self) -> &str {
        "change_directory"
    }

    fn description(&self) -> &str {
        "Change the session's current working directory; affects later commands and relative paths."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<ChangeDirectoryArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String> {
        let args: ChangeDirectoryArgs = parse_args(args)?;
        let target = ctx.resolve(args.path.trim());
        let canonical = tokio::fs::canonicalize(&target)
            .await
            .map_err(|_| format!("Directory not found: {}", target.display()))?;
        if !canonical.is_dir() {
            return Err(format!("Path is not a directory: {}", canonical.display()));
        }
        Ok(json!({
            "previous": ctx.working_directory.display().to_string(),
            "path": canonical.display().to_string(),
        }))
    }
}

pub struct CurrentDirectoryTool;

#[async_trait]
impl Tool for CurrentDirectoryTool {
    fn name(&self) -> &str {
        "get_current_directory"
    }

    fn description(&self) -> &str {
        "Return the session's current working directory."
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<Value, String> {
        Ok(json!({ "path": ctx.working_directory.display().to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_change_directory_resolves_relative() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = ToolContext::new("s1", dir.path());
        let out = ChangeDirectoryTool
            .execute(json!({"path": "sub"}), &ctx)
            .await
            .unwrap();
        assert!(out["path"].as_str().unwrap().ends_with("sub"));

        let err = ChangeDirectoryTool
            .execute(json!({"path": "missing"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.starts_with("Directory not found"));
    }

    #[tokio::test]
    async fn test_system_info_fields() {
        let ctx = ToolContext::new("s1", std::env::temp_dir());
        let out = SystemInfoTool.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(out["system"], std::env::consts::OS);
        assert!(out["cpus"].as_u64().unwrap() >= 1);
        let cwd = CurrentDirectoryTool.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(cwd["path"], std::env::temp_dir().display().to_string());
    }
}
