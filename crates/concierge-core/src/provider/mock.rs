//! Scripted model for tests

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{LanguageModel, ModelReply, TokenStream};
use crate::conversation::Message;
use crate::tools::ToolDefinition;

/// One observed call to the scripted model
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Replays a fixed queue of replies and records every call it receives.
/// Fails loudly when the script runs out, so a test that makes one call
/// too many points straight at the extra call.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ModelReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    fn record(&self, messages: &[Message], tools: &[ToolDefinition], system: &str) {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });
    }

    fn next_reply(&self) -> Result<ModelReply> {
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => Ok(reply),
            None => bail!("scripted model exhausted: no reply queued for this call"),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ModelReply> {
        self.record(messages, tools, system);
        self.next_reply()
    }

    async fn chat_stream(&self, messages: &[Message], system: &str) -> Result<TokenStream> {
        self.record(messages, &[], system);
        let reply = self.next_reply()?;
        Ok(Box::pin(futures_util::stream::once(async move {
            Ok(reply.content)
        })))
    }
}
