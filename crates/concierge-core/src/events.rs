//! Events emitted to the session transport during a turn

use serde::{Deserialize, Serialize};

use crate::conversation::ToolCall;

/// Ordered events produced by `start`/`resume`, consumed by the transport
/// (chat UI, CLI) that owns the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AssistantEvent {
    /// Incremental answer text
    TextToken { session_id: String, text: String },
    /// A sensitive tool call awaits human review; the session is suspended
    ReviewRequested {
        session_id: String,
        tool_call: ToolCall,
        prompt: String,
    },
    /// The turn reached a terminal state
    TurnComplete { session_id: String },
}
