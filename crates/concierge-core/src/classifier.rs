//! Request classifier: normal chat vs. the agent-backed path

use serde::Deserialize;
use tracing::{debug, warn};

use crate::conversation::Message;
use crate::prompts::CLASSIFY_SYSTEM_PROMPT;
use crate::provider::{structured, LanguageModel};

/// Which pipeline handles the incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Plain conversation, answered directly by the chatbot
    Normal,
    /// Calendar or email work, routed through the supervisor
    Advanced,
}

#[derive(Debug, Deserialize)]
struct ClassificationOutput {
    classification: String,
}

/// Classify the latest user message in isolation. Anything that is not a
/// clean "normal" verdict, including malformed model output, goes to the
/// advanced path; misrouting small talk to the supervisor costs a little
/// latency, while the other direction loses capability.
pub async fn classify(model: &dyn LanguageModel, latest: &str) -> RequestKind {
    let messages = [Message::human(latest)];
    let verdict: Result<ClassificationOutput, _> =
        structured::ask(model, CLASSIFY_SYSTEM_PROMPT, &messages).await;

    match verdict {
        Ok(output) if output.classification == "normal" => {
            debug!("Classified message as normal");
            RequestKind::Normal
        }
        Ok(output) => {
            debug!("Classified message as {}", output.classification);
            RequestKind::Advanced
        }
        Err(e) => {
            warn!("Classification failed, assuming advanced: {}", e);
            RequestKind::Advanced
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::ScriptedModel;
    use crate::provider::ModelReply;

    async fn classify_with(reply: ModelReply) -> RequestKind {
        let model = ScriptedModel::new(vec![reply]);
        classify(&model, "hello there").await
    }

    #[tokio::test]
    async fn test_normal_verdict() {
        let kind = classify_with(ModelReply::text(r#"{"classification": "normal"}"#)).await;
        assert_eq!(kind, RequestKind::Normal);
    }

    #[tokio::test]
    async fn test_advanced_verdict() {
        let kind = classify_with(ModelReply::text(r#"{"classification": "advanced"}"#)).await;
        assert_eq!(kind, RequestKind::Advanced);
    }

    #[tokio::test]
    async fn test_unknown_label_is_advanced() {
        let kind = classify_with(ModelReply::text(r#"{"classification": "Normal"}"#)).await;
        assert_eq!(kind, RequestKind::Advanced);
    }

    #[tokio::test]
    async fn test_garbage_reply_is_advanced() {
        let kind = classify_with(ModelReply::text("I cannot decide.")).await;
        assert_eq!(kind, RequestKind::Advanced);
    }

    #[tokio::test]
    async fn test_only_latest_message_is_sent() {
        let model = ScriptedModel::new(vec![ModelReply::text(
            r#"{"classification": "normal"}"#,
        )]);
        classify(&model, "what's the weather").await;
        let calls = model.calls();
        assert_eq!(calls[0].messages.len(), 1);
        assert_eq!(calls[0].messages[0].content, "what's the weather");
    }
}
