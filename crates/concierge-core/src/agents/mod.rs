//! Sub-agent loop: think with tools, execute safe calls, suspend on
//! sensitive ones for human review

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use concierge_memory::MemoryStore;

use crate::conversation::{Conversation, Message, ToolCall};
use crate::error::{OrchestratorError, Result};
use crate::prompts::{RESPOND_WITH_REAL_OUTPUT, REVIEW_QUESTION};
use crate::provider::{LanguageModel, ModelReply};
use crate::tools::ToolRegistry;

/// Human decision on a pending sensitive tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Run the reviewed tool call as proposed
    Continue,
    /// Reject the call; the text goes back to the agent as the call's result
    Feedback(String),
}

/// How one sub-agent run ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubAgentOutcome {
    /// The agent produced a final text reply for this dispatch
    Finished { reply: String },
    /// A sensitive tool call needs approval before the agent can continue
    AwaitingReview { question: String, tool_call: ToolCall },
}

#[derive(Debug, Clone)]
pub struct SubAgentConfig {
    /// Empty-reply retries per think step before the turn fails
    pub max_empty_retries: u32,
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            max_empty_retries: 3,
        }
    }
}

/// A tool-using agent over one private conversation. The calendar and gmail
/// assistants are two instances of this type with different prompts, tool
/// registries, and (for gmail) an attached memory store.
pub struct SubAgent {
    name: String,
    system_prompt: String,
    model: Arc<dyn LanguageModel>,
    registry: ToolRegistry,
    memory: Option<Arc<MemoryStore>>,
    config: SubAgentConfig,
}

impl SubAgent {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        model: Arc<dyn LanguageModel>,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            model,
            registry,
            memory: None,
            config: SubAgentConfig::default(),
        }
    }

    pub fn with_memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_config(mut self, config: SubAgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the think/act loop until the agent finishes its reply or suspends
    /// on a sensitive tool call. The conversation is the agent's private
    /// buffer; the caller owns feeding it and reading it back.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        user_id: &str,
    ) -> Result<SubAgentOutcome> {
        loop {
            let reply = self.think(conversation, user_id).await?;
            match self.route(conversation, reply).await? {
                Some(outcome) => return Ok(outcome),
                None => continue,
            }
        }
    }

    /// Apply a review decision to the suspended tool call, then re-enter the
    /// think/act loop. The conversation must end with the assistant message
    /// whose call was sent for review.
    pub async fn resume(
        &self,
        conversation: &mut Conversation,
        user_id: &str,
        reviewed: &ToolCall,
        decision: ReviewDecision,
    ) -> Result<SubAgentOutcome> {
        match decision {
            ReviewDecision::Continue => {
                info!("{}: approved tool call {}", self.name, reviewed.name);
                let result = self.execute_with_fallback(reviewed).await;
                conversation.push_tool_result(reviewed, result)?;
            }
            ReviewDecision::Feedback(text) => {
                info!("{}: feedback on tool call {}", self.name, reviewed.name);
                conversation.push_tool_result(reviewed, text)?;
            }
        }
        self.run(conversation, user_id).await
    }

    /// One model call over the private conversation, with memory context and
    /// bounded empty-reply retries. Synthetic re-prompts live on a scratch
    /// copy and are never persisted.
    async fn think(&self, conversation: &Conversation, user_id: &str) -> Result<ModelReply> {
        let system = self.system_with_memories(conversation, user_id);
        self.store_memory_if_asked(conversation, user_id);

        let tools = self.registry.definitions();
        let mut scratch: Vec<Message> = conversation.messages().to_vec();
        let mut attempts = 0u32;
        loop {
            let reply = self
                .model
                .chat(&scratch, &tools, &system)
                .await
                .map_err(OrchestratorError::Provider)?;
            if !reply.is_unusable() {
                return Ok(reply);
            }
            attempts += 1;
            if attempts > self.config.max_empty_retries {
                warn!(
                    "{}: model returned {} empty replies, giving up",
                    self.name, attempts
                );
                return Err(OrchestratorError::ModelOutput { attempts });
            }
            debug!("{}: empty model reply, re-prompting", self.name);
            scratch.push(Message::human(RESPOND_WITH_REAL_OUTPUT));
        }
    }

    /// Record the reply and decide what happens next. None means the loop
    /// goes back to think; Some ends this run.
    async fn route(
        &self,
        conversation: &mut Conversation,
        reply: ModelReply,
    ) -> Result<Option<SubAgentOutcome>> {
        if reply.tool_calls.is_empty() {
            let text = reply.content.clone();
            conversation.push(Message::assistant(reply.content, Vec::new()));
            return Ok(Some(SubAgentOutcome::Finished { reply: text }));
        }

        if reply.tool_calls.len() > 1 {
            warn!(
                "{}: model issued {} tool calls in one message; review \
                 handling assumes one",
                self.name,
                reply.tool_calls.len()
            );
        }

        // Sensitivity is judged on the first call, while review (and the
        // feedback result id) target the last. With a single call the two
        // coincide.
        let first = &reply.tool_calls[0];
        if self.registry.is_sensitive(&first.name) {
            let reviewed = reply.tool_calls.last().cloned().unwrap_or_else(|| first.clone());
            conversation.push(Message::assistant(reply.content.clone(), reply.tool_calls));
            return Ok(Some(SubAgentOutcome::AwaitingReview {
                question: REVIEW_QUESTION.to_string(),
                tool_call: reviewed,
            }));
        }

        let calls = reply.tool_calls.clone();
        conversation.push(Message::assistant(reply.content, reply.tool_calls));
        for call in &calls {
            // A sensitive call riding behind a safe one never runs here.
            let result = if self.registry.is_sensitive(&call.name) {
                warn!(
                    "{}: refusing to run sensitive tool {} outside review",
                    self.name, call.name
                );
                format!(
                    "Error: tool '{}' requires human review and cannot run here.\n\
                     Please fix your mistakes.",
                    call.name
                )
            } else {
                self.execute_with_fallback(call).await
            };
            conversation.push_tool_result(call, result)?;
        }
        Ok(None)
    }

    /// Tool failures become tool-role error text instead of ending the turn
    async fn execute_with_fallback(&self, call: &ToolCall) -> String {
        match self.registry.execute(&call.name, call.args.clone()).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{}: tool {} failed: {}", self.name, call.name, e);
                format!("Error: {}\nPlease fix your mistakes.", e)
            }
        }
    }

    fn system_with_memories(&self, conversation: &Conversation, user_id: &str) -> String {
        let Some(memory) = &self.memory else {
            return self.system_prompt.clone();
        };
        let query = conversation
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let memories = match memory.search(user_id, query, 2) {
            Ok(memories) => memories,
            Err(e) => {
                warn!("{}: memory search failed: {}", self.name, e);
                Vec::new()
            }
        };
        if memories.is_empty() {
            return self.system_prompt.clone();
        }
        format!(
            "{}\n## Memories of user\n{}",
            self.system_prompt,
            memories.join("\n")
        )
    }

    /// Naive trigger carried over on purpose: any message mentioning
    /// "remember" is stored verbatim under a fresh key, every think step.
    fn store_memory_if_asked(&self, conversation: &Conversation, user_id: &str) {
        let Some(memory) = &self.memory else {
            return;
        };
        let Some(last) = conversation.last() else {
            return;
        };
        if !last.content.to_lowercase().contains("remember") {
            return;
        }
        match memory.put(user_id, &last.content) {
            Ok(id) => debug!("{}: stored memory {} for {}", self.name, id, user_id),
            Err(e) => warn!("{}: failed to store memory: {}", self.name, e),
        }
    }
}
