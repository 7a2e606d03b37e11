//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：infer（带工具目录，返回文本或工具调用）、
//! complete（无工具的纯文本补全）。传输、鉴权、超时错误显式返回 LlmError，由编排层决定是否终止本轮。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ToolCall;
use crate::memory::Message;
use crate::tools::ToolSpec;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request timed out")]
    Timeout,

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// 一次推理的结果：content 与 tool_calls 可同时存在；tool_calls 为空表示最终回复
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmReply {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl LlmReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 带工具目录推理（tools 为空时等同纯文本补全）
    async fn infer(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<LlmReply, LlmError>;

    /// 纯文本补全
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let reply = self.infer(messages, &[]).await?;
        Ok(reply.content.unwrap_or_default())
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
