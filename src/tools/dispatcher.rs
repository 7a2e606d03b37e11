//! 工具分发器
//!
//! 持有 ToolRegistry 与全局超时，invoke(call, ctx) 先查能力表再在超时内执行工具；
//! 失败、超时、未知工具都折叠为 success=false 的 ToolResult，不向上抛错。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{ToolCall, ToolResult};
use crate::tools::{Capability, ToolContext, ToolRegistry, ToolSpec};

pub struct ToolDispatcher {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一次工具调用，结果总是一个 ToolResult
    pub async fn invoke(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let start = Instant::now();
        let (result, outcome) = self.run(call, ctx).await;

        let audit = serde_json::json!({
            "event": "tool_audit",
            "session": ctx.session_id,
            "tool": call.name,
            "call_id": call.id,
            "ok": result.success,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        result
    }

    async fn run(&self, call: &ToolCall, ctx: &ToolContext) -> (ToolResult, &'static str) {
        if Capability::of(&call.name).is_none() {
            return (
                ToolResult::failed(call, format!("Unknown tool: {}", call.name)),
                "unknown",
            );
        }
        let Some(tool) = self.registry.get(&call.name) else {
            return (
                ToolResult::failed(call, format!("Tool not registered: {}", call.name)),
                "unregistered",
            );
        };
        let args = if call.args.is_null() {
            Value::Object(Default::default())
        } else {
            call.args.clone()
        };
        match timeout(self.timeout, tool.execute(args, ctx)).await {
            Ok(Ok(payload)) => (ToolResult::ok(call, payload), "ok"),
            Ok(Err(e)) => (ToolResult::failed(call, e), "error"),
            Err(_) => (
                ToolResult::failed(
                    call,
                    format!("Tool {} timed out after {}s", call.name, self.timeout.as_secs()),
                ),
                "timeout",
            ),
        }
    }

    /// 是否可执行（在能力表中且已注册）
    pub fn can_invoke(&self, name: &str) -> bool {
        Capability::of(name).is_some() && self.registry.contains(name)
    }

    /// 供模型使用的工具目录
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.registry
            .specs()
            .into_iter()
            .filter(|spec| Capability::of(&spec.name).is_some())
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::json;

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "fetch_url"
        }
        fn description(&self) -> &str {
            "never finishes in time"
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "read_file"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, String> {
            Err("File not found: missing.rs".into())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("s1", std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_result() {
        let dispatcher = ToolDispatcher::new(ToolRegistry::new(), 1);
        let call = ToolCall::new("c1", "format_disk", json!({}));
        let result = dispatcher.invoke(&call, &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: format_disk"));
        assert_eq!(result.tool_call_id, "c1");
    }

    #[tokio::test]
    async fn test_tool_error_and_timeout_fold_into_results() {
        let mut registry = ToolRegistry::new();
        registry.register(Slow);
        registry.register(Failing);
        let dispatcher = ToolDispatcher::new(registry, 1);

        let failed = dispatcher
            .invoke(&ToolCall::new("c1", "read_file", json!({"file_path": "missing.rs"})), &ctx())
            .await;
        assert_eq!(failed.error.as_deref(), Some("File not found: missing.rs"));

        let timed_out = dispatcher
            .invoke(&ToolCall::new("c2", "fetch_url", json!({"url": "https://x"})), &ctx())
            .await;
        assert!(!timed_out.success);
        assert!(timed_out.error.unwrap().contains("timed out"));
    }
}
