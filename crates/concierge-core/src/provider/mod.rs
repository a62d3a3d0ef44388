//! Language-model abstraction
//!
//! The orchestration core treats the model as an opaque capability: given
//! role-tagged messages and optionally a tool set, it produces text and/or
//! tool call requests. Structured decisions (classifier, supervisor) go
//! through the ask-for-JSON helper in [`structured`].

pub mod anthropic;
pub mod mock;
pub mod structured;

pub use anthropic::AnthropicModel;
pub use mock::ScriptedModel;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

use crate::conversation::{Message, ToolCall};
use crate::tools::ToolDefinition;

/// One model completion: free text and/or tool call requests
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }

    /// No tool calls and no usable text content
    pub fn is_unusable(&self) -> bool {
        self.tool_calls.is_empty() && self.content.trim().is_empty()
    }
}

/// Finite, non-restartable sequence of answer fragments
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Opaque language-model capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete the conversation, optionally bound to a tool set
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ModelReply>;

    /// Streaming completion without tools. The default falls back to a
    /// single fragment from `chat`; providers with native streaming override.
    async fn chat_stream(&self, messages: &[Message], system: &str) -> Result<TokenStream> {
        let reply = self.chat(messages, &[], system).await?;
        Ok(Box::pin(futures_util::stream::once(async move {
            Ok(reply.content)
        })))
    }
}
