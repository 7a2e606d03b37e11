//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url），支持 function tools；
//! DeepSeek、OpenAI、自建代理均可。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTools, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::ToolCall;
use crate::llm::{LlmClient, LlmError, LlmReply};
use crate::memory::{Message, Role};
use crate::tools::ToolSpec;

pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，infer 时把 Message / ToolSpec 转为 API 类型
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url.trim_end_matches('/'))
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature: 0.2,
            timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// 内部 Message → API 请求消息
fn to_request_message(m: &Message) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let message = match m.role {
        Role::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(m.content.clone())
                .build()?,
        ),
        Role::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(m.content.clone())
                .build()?,
        ),
        Role::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !m.content.is_empty() || m.tool_calls.is_empty() {
                args.content(m.content.clone());
            }
            if !m.tool_calls.is_empty() {
                args.tool_calls(to_message_tool_calls(&m.tool_calls)?);
            }
            ChatCompletionRequestMessage::Assistant(args.build()?)
        }
        Role::Tool => ChatCompletionRequestMessage::Tool(
            ChatCompletionRequestToolMessageArgs::default()
                .content(m.content.clone())
                .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                .build()?,
        ),
    };
    Ok(message)
}

/// assistant 历史中的工具调用；arguments 在 API 中是 JSON 字符串
fn to_message_tool_calls(calls: &[ToolCall]) -> Result<Vec<ChatCompletionMessageToolCalls>, OpenAIError> {
    let raw: Vec<Value> = calls
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "type": "function",
                "function": { "name": c.name, "arguments": c.args.to_string() }
            })
        })
        .collect();
    serde_json::from_value(Value::Array(raw)).map_err(|e| OpenAIError::InvalidArgument(e.to_string()))
}

/// 工具目录 → function tools
fn to_tools(tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTools>, OpenAIError> {
    let raw: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect();
    serde_json::from_value(Value::Array(raw)).map_err(|e| OpenAIError::InvalidArgument(e.to_string()))
}

/// 解析模型给出的参数字符串；空串视为 {}，非法 JSON 原样保留在 `_raw`
fn parse_arguments(tool: &str, arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| {
        tracing::warn!(tool = %tool, "tool arguments are not valid JSON");
        json!({ "_raw": arguments })
    })
}

fn from_response_tool_calls(calls: Vec<ChatCompletionMessageToolCalls>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .filter_map(|call| match call {
            ChatCompletionMessageToolCalls::Function(c) => {
                let args = parse_arguments(&c.function.name, &c.function.arguments);
                Some(ToolCall::new(c.id, c.function.name, args))
            }
            #[allow(unreachable_patterns)]
            _ => {
                tracing::warn!("ignoring non-function tool call");
                None
            }
        })
        .collect()
}

fn map_openai_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::Reqwest(err) if err.is_timeout() => LlmError::Timeout,
        OpenAIError::Reqwest(err) => LlmError::Transport(err.to_string()),
        OpenAIError::ApiError(api) => {
            let message = api.message.clone();
            let lower = message.to_lowercase();
            if lower.contains("api key") || lower.contains("authentication") || lower.contains("unauthorized") {
                LlmError::Auth(message)
            } else {
                LlmError::Api(message.chars().take(500).collect())
            }
        }
        OpenAIError::JSONDeserialize(..) => LlmError::InvalidResponse(e.to_string()),
        other => LlmError::Transport(other.to_string()),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn infer(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<LlmReply, LlmError> {
        let request_messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_openai_error)?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(request_messages)
            .temperature(self.temperature);
        if !tools.is_empty() {
            args.tools(to_tools(tools).map_err(map_openai_error)?);
        }
        let request = args.build().map_err(map_openai_error)?;

        tracing::debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "llm request");
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".into()))?;
        Ok(LlmReply {
            content: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls: from_response_tool_calls(choice.message.tool_calls.unwrap_or_default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_message_shapes() {
        let call = ToolCall::new("c1", "read_file", json!({"file_path": "a.rs"}));
        let assistant = to_request_message(&Message::assistant_with_calls("", vec![call])).unwrap();
        let assistant = serde_json::to_value(&assistant).unwrap();
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["tool_calls"][0]["id"], "c1");
        assert_eq!(assistant["tool_calls"][0]["function"]["arguments"], "{\"file_path\":\"a.rs\"}");

        let tool = serde_json::to_value(to_request_message(&Message::tool("c1", "Error: not found")).unwrap()).unwrap();
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "c1");
    }

    #[test]
    fn test_tool_catalog_conversion() {
        let spec = ToolSpec {
            name: "check_service".into(),
            description: "Check a service".into(),
            parameters: json!({"type": "object", "properties": {"service_name": {"type": "string"}}}),
        };
        let tools = serde_json::to_value(to_tools(&[spec]).unwrap()).unwrap();
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "check_service");
    }

    #[test]
    fn test_response_tool_calls_are_parsed() {
        let calls: Vec<ChatCompletionMessageToolCalls> = serde_json::from_value(json!([
            {"id": "call_1", "type": "function", "function": {"name": "check_service", "arguments": "{\"service_name\":\"nginx\"}"}},
            {"id": "call_2", "type": "function", "function": {"name": "run_command", "arguments": "not json"}}
        ]))
        .unwrap();
        let calls = from_response_tool_calls(calls);
        assert_eq!(calls[0].name, "check_service");
        assert_eq!(calls[0].args["service_name"], "nginx");
        assert_eq!(calls[1].args["_raw"], "not json");
        assert_eq!(parse_arguments("x", "  "), json!({}));
    }
}
