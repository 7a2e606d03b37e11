//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找，
//! ToolDispatcher 在调用时加超时并把结果折叠为 ToolResult。

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// 工具执行上下文：来自会话（工作目录等）
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub working_directory: PathBuf,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            working_directory: working_directory.into(),
        }
    }

    /// 相对路径按会话工作目录解析，并按词法折叠 `.` / `..`（不访问文件系统）
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            normalize_lexically(p)
        } else {
            normalize_lexically(&self.working_directory.join(p))
        }
    }
}

/// 折叠 `.` 与 `..`；根目录之上的 `..` 被丢弃
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（即 function calling 中的 function name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具：成功返回结构化 payload，失败返回错误描述
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String>;
}

/// 发给模型的工具描述（function calling 的 tools 数组元素）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 同名工具会被替换（测试中用于注入 mock）
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 已注册的工具名（排序，保证输出稳定）
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 工具目录（按名称排序）
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "get_current_directory"
        }
        fn description(&self) -> &str {
            "echo cwd"
        }
        async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<Value, String> {
            Ok(serde_json::json!({ "path": ctx.working_directory }))
        }
    }

    #[test]
    fn test_register_and_specs_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        assert!(registry.contains("get_current_directory"));
        let specs = registry.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].parameters["type"], "object");
    }

    #[test]
    fn test_context_resolves_relative_paths() {
        let ctx = ToolContext::new("s", "/srv/app");
        assert_eq!(ctx.resolve("src/main.rs"), PathBuf::from("/srv/app/src/main.rs"));
        assert_eq!(ctx.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_context_folds_dot_segments() {
        let ctx = ToolContext::new("s", "/srv/app");
        assert_eq!(ctx.resolve("/tmp/../etc/cron.d/job"), PathBuf::from("/etc/cron.d/job"));
        assert_eq!(ctx.resolve("../../etc/./passwd"), PathBuf::from("/etc/passwd"));
        assert_eq!(ctx.resolve("/../.."), PathBuf::from("/"));
    }
}
