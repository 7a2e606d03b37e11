//! chat_agent 节点：闲聊意图，单次无工具调用的回复

use crate::core::OrchestrationState;
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

const CHAT_SYSTEM_PROMPT: &str =
    "You are a friendly assistant embedded in a developer command center. Answer conversationally and concisely.";

/// 以本轮历史调用一次模型（不带工具目录）
pub async fn chat_reply(llm: &dyn LlmClient, state: &OrchestrationState) -> Result<String, LlmError> {
    let mut messages = Vec::with_capacity(state.messages.len() + 1);
    messages.push(Message::system(CHAT_SYSTEM_PROMPT));
    messages.extend(state.messages.iter().cloned());
    llm.complete(&messages).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_chat_reply_uses_latest_user_turn() {
        let state = OrchestrationState::new("s1", "hello there", &[]);
        let reply = chat_reply(&MockLlmClient, &state).await.unwrap();
        assert_eq!(reply, "Echo from Mock: hello there");
    }
}
