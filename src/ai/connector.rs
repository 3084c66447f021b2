// src/ai/connector.rs
use anyhow::Result;
use serde_json::Value;

/// A single-turn chat request
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub prompt: String,
    pub system_prompt: String,
    /// Overrides the connector's own model when set
    pub model: Option<String>,
}

/// Trait defining the interface for LLM text providers
pub trait LlmConnector: Send + Sync {
    /// Identifier used for provider selection
    fn id(&self) -> &str;

    /// Send a chat request and return the reply object, to be read with
    /// `ReplyText::decode`
    fn text_chat(&self, request: &ChatRequest) -> Result<Value>;
}
