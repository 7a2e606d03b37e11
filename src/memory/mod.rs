//! 记忆层：短期对话历史（跨轮次的会话记忆）

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
