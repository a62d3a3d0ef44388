//! Anthropic provider: messages API with tool use and SSE streaming

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::{LanguageModel, ModelReply, TokenStream};
use crate::conversation::{Message, Role, ToolCall};
use crate::tools::ToolDefinition;

/// Anthropic API client
#[derive(Clone)]
pub struct AnthropicModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for AnthropicModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Mask the API key in debug output
        let chars: Vec<char> = self.api_key.chars().collect();
        let masked_key = if chars.len() > 7 {
            let head: String = chars[..3].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        } else {
            "***".to_string()
        };

        f.debug_struct("AnthropicModel")
            .field("api_key", &masked_key)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnthropicModel {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            model: model.unwrap_or_else(|| "claude-sonnet-4-5".to_string()),
            max_tokens: 4096,
        }
    }

    /// Set a custom base URL (proxies, regional endpoints, test servers)
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
        stream: bool,
    ) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": to_wire(messages),
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools).unwrap_or_default();
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "API request failed with status {}: {}",
                status,
                error_text
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ModelReply> {
        debug!(
            "Sending request to Anthropic API with {} messages, {} tools",
            messages.len(),
            tools.len()
        );

        let body = self.request_body(messages, tools, system, false);
        let response: WireResponse = self
            .send(&body)
            .await?
            .json()
            .await
            .context("Failed to parse API response")?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                WireBlock::Text { text } => {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(&text);
                }
                WireBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        args: input,
                    });
                }
                WireBlock::ToolResult { .. } => {}
            }
        }

        debug!(
            "Received reply: {} chars, {} tool calls, stop_reason {:?}",
            content.len(),
            tool_calls.len(),
            response.stop_reason
        );

        Ok(ModelReply {
            content,
            tool_calls,
        })
    }

    async fn chat_stream(&self, messages: &[Message], system: &str) -> Result<TokenStream> {
        let body = self.request_body(messages, &[], system, true);
        let response = self.send(&body).await?;
        let bytes = response.bytes_stream();

        // SSE: split on newlines, pick text deltas out of
        // content_block_delta events, one fragment per delta
        let stream = futures_util::stream::try_unfold(
            (bytes, String::new(), VecDeque::new()),
            |(mut bytes, mut buffer, mut queue)| async move {
                loop {
                    if let Some(token) = queue.pop_front() {
                        return Ok(Some((token, (bytes, buffer, queue))));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.push_str(&String::from_utf8_lossy(&chunk));
                            while let Some(pos) = buffer.find('\n') {
                                let line = buffer[..pos].trim().to_string();
                                buffer.drain(..=pos);
                                let Some(data) = line.strip_prefix("data: ") else {
                                    continue;
                                };
                                let Ok(event) = serde_json::from_str::<Value>(data) else {
                                    continue;
                                };
                                if event["type"] == "content_block_delta" {
                                    if let Some(text) = event["delta"]["text"].as_str() {
                                        if !text.is_empty() {
                                            queue.push_back(text.to_string());
                                        }
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            return Err(anyhow!("stream error from Anthropic API: {}", e));
                        }
                        None => return Ok(None),
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

// ── Wire format ──

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
}

/// Convert conversation messages to the Anthropic wire shape. Tool results
/// become user-role tool_result blocks; consecutive same-role messages are
/// merged, which the API requires.
fn to_wire(messages: &[Message]) -> Vec<WireMessage> {
    let mut wire: Vec<WireMessage> = Vec::new();

    for message in messages {
        let (role, blocks) = match message.role {
            Role::Human | Role::System => {
                let text = match &message.author {
                    Some(author) => format!("[{}] {}", author, message.content),
                    None => message.content.clone(),
                };
                ("user", vec![WireBlock::Text { text }])
            }
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(WireBlock::Text {
                        text: message.content.clone(),
                    });
                }
                for call in &message.tool_calls {
                    blocks.push(WireBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.args.clone(),
                    });
                }
                ("assistant", blocks)
            }
            Role::Tool => (
                "user",
                vec![WireBlock::ToolResult {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: message.content.clone(),
                }],
            ),
        };

        if blocks.is_empty() {
            continue;
        }
        match wire.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => wire.push(WireMessage { role, content: blocks }),
        }
    }

    wire
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_debug_masks_key() {
        let model = AnthropicModel::new("sk-ant-1234567890abcdef".to_string(), None);
        let output = format!("{:?}", model);
        assert!(output.contains("sk-...cdef"));
        assert!(!output.contains("sk-ant-1234567890abcdef"));
    }

    #[test]
    fn test_debug_masks_multibyte_key() {
        let model = AnthropicModel::new("sk-ütesté1234ü".to_string(), None);
        let output = format!("{:?}", model);
        assert!(output.contains("sk-...234ü"));
    }

    #[test]
    fn test_to_wire_tool_result_is_user_role() {
        let call = ToolCall::new("send_email", json!({}));
        let mut convo = crate::conversation::Conversation::new();
        convo.push(Message::assistant("", vec![call.clone()]));
        convo.push_tool_result(&call, "sent").unwrap();

        let wire = to_wire(convo.messages());
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "assistant");
        assert_eq!(wire[1].role, "user");
        assert!(matches!(wire[1].content[0], WireBlock::ToolResult { .. }));
    }

    #[test]
    fn test_to_wire_merges_consecutive_user_messages() {
        let messages = vec![
            Message::human("list my events"),
            Message::authored("calendar_agent", "You have 3 events."),
        ];
        let wire = to_wire(&messages);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].content.len(), 2);
    }

    #[test]
    fn test_to_wire_author_prefix() {
        let wire = to_wire(&[Message::authored("gmail_agent", "Inbox is empty.")]);
        match &wire[0].content[0] {
            WireBlock::Text { text } => assert_eq!(text, "[gmail_agent] Inbox is empty."),
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_wire_response_parse() {
        let raw = r#"{
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "Creating the event now."},
                {"type": "tool_use", "id": "toolu_1", "name": "create_calendar_event", "input": {"title": "Standup"}}
            ],
            "stop_reason": "tool_use"
        }"#;
        let response: WireResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.content.len(), 2);
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
    }
}
