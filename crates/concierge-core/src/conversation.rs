//! Conversation model shared by the orchestrator and sub-agents
//!
//! A conversation is an ordered, append-only sequence of messages. The core
//! invariant: every assistant message that carries tool calls must be
//! answered, before the next assistant message, by one tool-role message per
//! call id. The append helpers here enforce that by construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::OrchestratorError;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
    Tool,
    System,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl ToolCall {
    /// Build a tool call with a generated id. Real ids come from the
    /// provider; this is for mock providers and tests.
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Name of the sub-agent that authored this message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Tool calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool-role messages: the call id this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool-role messages: the name of the tool that was called
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
            author: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Human-role message tagged with a sub-agent author, used when a
    /// sub-agent reports back into the shared conversation
    pub fn authored(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            ..Self::human(content)
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            author: None,
            tool_calls,
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Assistant message tagged with an author name
    pub fn assistant_authored(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            ..Self::assistant(content, Vec::new())
        }
    }

    fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            author: None,
            tool_calls: Vec::new(),
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
        }
    }
}

/// Ordered, append-only message sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a non-tool message
    pub fn push(&mut self, message: Message) {
        debug_assert!(message.role != Role::Tool, "use push_tool_result for tool messages");
        self.messages.push(message);
    }

    /// Append a tool-role message answering one of the pending tool calls.
    /// Rejects call ids that do not answer the last assistant message.
    pub fn push_tool_result(
        &mut self,
        call: &ToolCall,
        content: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        let pending = self.pending_tool_calls();
        if !pending.iter().any(|c| c.id == call.id) {
            return Err(OrchestratorError::StrayToolResult {
                call_id: call.id.clone(),
            });
        }
        self.messages.push(Message::tool_result(call, content));
        Ok(())
    }

    /// The last assistant message in the conversation, if any
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Tool calls issued by the most recent assistant message that have not
    /// yet been answered by a tool-role message
    pub fn pending_tool_calls(&self) -> Vec<ToolCall> {
        let mut answered = Vec::new();
        for message in self.messages.iter().rev() {
            match message.role {
                Role::Tool => {
                    if let Some(id) = &message.tool_call_id {
                        answered.push(id.clone());
                    }
                }
                Role::Assistant => {
                    return message
                        .tool_calls
                        .iter()
                        .filter(|c| !answered.contains(&c.id))
                        .cloned()
                        .collect();
                }
                _ => return Vec::new(),
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serde_round_trip() {
        let call = ToolCall::new("send_email", json!({"to_email": "a@b.c"}));
        let msg = Message::assistant("sending now", vec![call.clone()]);

        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.tool_calls[0].id, call.id);
    }

    #[test]
    fn test_pending_tool_calls_tracks_unanswered() {
        let mut convo = Conversation::new();
        let call = ToolCall::new("get_next_n_calendar_events", json!({"n": 3}));
        convo.push(Message::human("what's next?"));
        convo.push(Message::assistant("", vec![call.clone()]));

        assert_eq!(convo.pending_tool_calls().len(), 1);
        convo.push_tool_result(&call, "3 events found").unwrap();
        assert!(convo.pending_tool_calls().is_empty());
    }

    #[test]
    fn test_stray_tool_result_rejected() {
        let mut convo = Conversation::new();
        convo.push(Message::human("hello"));

        let stray = ToolCall::new("send_email", json!({}));
        let err = convo.push_tool_result(&stray, "done").unwrap_err();
        assert!(matches!(err, OrchestratorError::StrayToolResult { .. }));
        assert_eq!(convo.len(), 1);
    }

    #[test]
    fn test_tool_results_are_a_permutation_of_requests() {
        let mut convo = Conversation::new();
        let a = ToolCall::new("fetch_inbox_messages", json!({"max_results": 5}));
        let b = ToolCall::new("get_email_details", json!({"message_id": "m1"}));
        convo.push(Message::assistant("", vec![a.clone(), b.clone()]));

        // Answer out of order: still a valid permutation
        convo.push_tool_result(&b, "details").unwrap();
        convo.push_tool_result(&a, "inbox").unwrap();

        let assistant = convo.last_assistant().unwrap();
        let request_ids: Vec<_> = assistant.tool_calls.iter().map(|c| &c.id).collect();
        let result_ids: Vec<_> = convo
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_ref())
            .collect();

        assert_eq!(result_ids.len(), request_ids.len());
        for id in request_ids {
            assert!(result_ids.contains(&id));
        }
        assert!(convo.pending_tool_calls().is_empty());
    }

    #[test]
    fn test_duplicate_tool_result_rejected() {
        let mut convo = Conversation::new();
        let call = ToolCall::new("send_email", json!({}));
        convo.push(Message::assistant("", vec![call.clone()]));

        convo.push_tool_result(&call, "sent").unwrap();
        let err = convo.push_tool_result(&call, "sent again").unwrap_err();
        assert!(matches!(err, OrchestratorError::StrayToolResult { .. }));
    }

    #[test]
    fn test_authored_message() {
        let msg = Message::authored("calendar_agent", "You have 3 events today.");
        assert_eq!(msg.role, Role::Human);
        assert_eq!(msg.author.as_deref(), Some("calendar_agent"));
    }
}
