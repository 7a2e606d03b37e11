//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage, OPENAI_DEFAULT_MODEL};
pub use traits::{LlmClient, LlmError, LlmReply};

use crate::config::LlmSection;

/// 按 [llm] 配置创建客户端：provider = openai / deepseek / mock（未知值回退 mock 并告警）
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    match cfg.provider.to_lowercase().as_str() {
        "openai" => {
            let model = cfg.model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL);
            tracing::info!(model = %model, "Using OpenAI-compatible LLM");
            Arc::new(
                OpenAiClient::new(cfg.base_url.as_deref(), model, None)
                    .with_timeout(cfg.timeouts.request)
                    .with_temperature(cfg.temperature),
            )
        }
        "deepseek" => {
            let client = create_deepseek_client(cfg.model.as_deref(), cfg.base_url.as_deref())
                .with_timeout(cfg.timeouts.request)
                .with_temperature(cfg.temperature);
            tracing::info!(model = %client.model(), "Using DeepSeek LLM");
            Arc::new(client)
        }
        "mock" => {
            tracing::info!("Using mock LLM (offline)");
            Arc::new(MockLlmClient)
        }
        other => {
            tracing::warn!(provider = %other, "Unknown LLM provider, falling back to mock");
            Arc::new(MockLlmClient)
        }
    }
}
