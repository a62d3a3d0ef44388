//! concierge-core - The conversational core of the concierge assistant
//!
//! This crate provides:
//! - Classifier splitting plain chat from calendar/email work
//! - Supervisor routing between the calendar and gmail sub-agents
//! - Sub-agent loop with human review of sensitive tool calls
//! - Anthropic provider with tool use and streaming
//! - Google Calendar and Gmail tool sets
//! - Durable session state so a pending review survives a restart

pub mod agents;
pub mod classifier;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod sessions;
pub mod supervisor;
pub mod tools;

// Re-export main types for convenience
pub use agents::{ReviewDecision, SubAgent, SubAgentConfig, SubAgentOutcome};
pub use classifier::RequestKind;
pub use conversation::{Conversation, Message, Role, ToolCall};
pub use credentials::{CredentialProvider, FileCredentials, StaticCredentials};
pub use error::{OrchestratorError, Result};
pub use events::AssistantEvent;
pub use orchestrator::{Assistant, OrchestratorState, PendingInterrupt};
pub use provider::{AnthropicModel, LanguageModel, ModelReply, ScriptedModel};
pub use sessions::SessionStore;
pub use supervisor::{Supervisor, SupervisorConfig, Worker};
pub use tools::{ToolDefinition, ToolHandler, ToolRegistry, ToolSafety};
