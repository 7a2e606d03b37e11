//! 编排错误类型
//!
//! 工具失败、规划失败不在此列：它们作为数据记录进 OrchestrationState（tool_results / errors），
//! 不会中断遍历。这里只放会让一次 turn 或一次 API 调用提前结束的错误。

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::core::machine::Node;
use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("LLM error: {0}")]
    Oracle(#[from] LlmError),

    #[error("Maximum iterations reached ({0}). The request may be too complex.")]
    MaxIterationsExceeded(usize),

    #[error("Invalid transition: {event} at node {node}")]
    InvalidTransition { node: Node, event: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("No pending approval for session {0}")]
    NoPendingApproval(String),

    #[error("Config error: {0}")]
    Config(String),
}
