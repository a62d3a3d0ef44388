//! Structured output: ask the model for JSON and parse it into a type

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::LanguageModel;
use crate::conversation::Message;

/// Ask the model a question whose system prompt demands a JSON object reply,
/// and deserialize that object into `T`. Tolerates prose around the JSON by
/// extracting the outermost braces before parsing.
pub async fn ask<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    system: &str,
    messages: &[Message],
) -> Result<T> {
    let reply = model.chat(messages, &[], system).await?;
    let json = extract_json(&reply.content)
        .ok_or_else(|| anyhow!("no JSON object in model reply: {}", reply.content))?;

    debug!("Extracted structured reply: {}", json);

    serde_json::from_str(json).with_context(|| format!("Failed to parse model JSON: {}", json))
}

/// Extract the outermost JSON object from a text reply. Models sometimes wrap
/// the object in markdown fences or a sentence of preamble.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
