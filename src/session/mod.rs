//! 会话：跨轮次的工作上下文（工作目录、最近命令、最近展示的文件、操作记录、对话历史）
//!
//! 会话内容注入 agent 的 system prompt，使“刚才那个文件”“在那个目录里运行”之类的指代可以被解析。

pub mod store;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ToolCall, ToolResult};
use crate::memory::ConversationMemory;
use crate::tools::ToolContext;

pub use store::SessionRegistry;

/// 最近展示文件保留的内容片段长度
const SNIPPET_CHARS: usize = 2000;

/// 会话 ID
pub type SessionId = String;

/// 最近一次展示给用户的文件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactShown {
    pub path: String,
    pub snippet: String,
    pub structure: Option<Value>,
}

/// 一次操作记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionAction {
    pub kind: String,
    pub detail: Value,
    pub success: bool,
    pub at: DateTime<Utc>,
}

/// 单个会话
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub working_directory: PathBuf,
    pub recent_commands: VecDeque<String>,
    pub last_artifact: Option<ArtifactShown>,
    pub recent_actions: VecDeque<SessionAction>,
    pub file_history: VecDeque<String>,
    pub conversation: ConversationMemory,
    max_history: usize,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, max: usize) {
    buf.push_back(item);
    while buf.len() > max {
        buf.pop_front();
    }
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        max_history: usize,
        max_context_turns: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            working_directory: working_directory.into(),
            recent_commands: VecDeque::new(),
            last_artifact: None,
            recent_actions: VecDeque::new(),
            file_history: VecDeque::new(),
            conversation: ConversationMemory::new(max_context_turns),
            max_history: max_history.max(1),
            created_at: now,
            last_active: now,
        }
    }

    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(self.id.clone(), self.working_directory.clone())
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// 记录最近展示的文件（内容只保留前 2000 个字符）
    pub fn update_artifact_shown(&mut self, path: &str, content: &str, structure: Option<Value>) {
        self.last_artifact = Some(ArtifactShown {
            path: path.to_string(),
            snippet: content.chars().take(SNIPPET_CHARS).collect(),
            structure,
        });
        self.record_file(path);
    }

    pub fn record_file(&mut self, path: &str) {
        if self.file_history.back().map(String::as_str) == Some(path) {
            return;
        }
        push_bounded(&mut self.file_history, path.to_string(), self.max_history);
    }

    pub fn change_directory(&mut self, dir: impl AsRef<Path>) {
        self.working_directory = dir.as_ref().to_path_buf();
    }

    pub fn add_command(&mut self, command: &str) {
        push_bounded(&mut self.recent_commands, command.to_string(), self.max_history);
    }

    pub fn record_action(&mut self, kind: &str, detail: Value, success: bool) {
        let action = SessionAction {
            kind: kind.to_string(),
            detail,
            success,
            at: Utc::now(),
        };
        push_bounded(&mut self.recent_actions, action, self.max_history);
    }

    /// 根据一次工具调用的结果更新会话
    pub fn apply_tool_result(&mut self, call: &ToolCall, result: &ToolResult) {
        let payload = result.payload.as_ref();
        match call.name.as_str() {
            "read_file" if result.success => {
                if let Some(p) = payload {
                    let path = p["file_path"]
                        .as_str()
                        .or_else(|| call.str_arg("file_path"))
                        .unwrap_or_default()
                        .to_string();
                    let content = p["content"].as_str().unwrap_or_default();
                    self.update_artifact_shown(&path, content, p.get("structure").cloned());
                }
            }
            "write_file" if result.success => {
                if let Some(path) = payload.and_then(|p| p["file_path"].as_str()) {
                    let path = path.to_string();
                    self.record_file(&path);
                }
            }
            "change_directory" if result.success => {
                if let Some(path) = payload.and_then(|p| p["path"].as_str()) {
                    self.change_directory(path);
                }
            }
            "run_command" => {
                if let Some(command) = call.str_arg("command") {
                    self.add_command(command);
                }
            }
            _ => {}
        }
        self.record_action(&call.name, call.args.clone(), result.success);
        self.touch();
    }

    /// 注入 system prompt 的上下文段落；无内容时返回空串
    pub fn context_for_llm(&self) -> String {
        let mut lines = Vec::new();
        if let Some(artifact) = &self.last_artifact {
            lines.push(format!("- Last file shown: {}", artifact.path));
            if let Some(summary) = artifact.structure.as_ref().and_then(structure_summary) {
                lines.push(format!("  Structure: {}", summary));
            }
        }
        lines.push(format!(
            "- Current directory: {}",
            self.working_directory.display()
        ));
        if let Some(cmd) = self.recent_commands.back() {
            lines.push(format!("- Last command: {}", cmd));
        }
        if self.file_history.len() > 1 {
            let recent: Vec<&str> = self
                .file_history
                .iter()
                .rev()
                .take(5)
                .map(String::as_str)
                .collect();
            lines.push(format!("- Recent files: {}", recent.join(", ")));
        }
        format!("Context:\n{}", lines.join("\n"))
    }
}

/// 结构摘要：如 "3 functions, 1 classes, 2 imports"
pub fn structure_summary(structure: &Value) -> Option<String> {
    let count = |key: &str| structure.get(key).and_then(|v| v.as_array()).map(|a| a.len());
    let parts: Vec<String> = [
        ("functions", count("functions")),
        ("classes", count("classes")),
        ("imports", count("imports")),
        ("tests", count("test_functions")),
    ]
    .into_iter()
    .filter_map(|(label, n)| n.filter(|n| *n > 0).map(|n| format!("{} {}", n, label)))
    .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
