//! Top-level assistant: classify, route, suspend, resume
//!
//! All conversation state lives in `OrchestratorState`, which is persisted
//! through the session store at every suspension and terminal point, so a
//! pending review survives a restart.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::agents::ReviewDecision;
use crate::classifier::{classify, RequestKind};
use crate::conversation::{Conversation, Message, ToolCall};
use crate::error::{OrchestratorError, Result};
use crate::events::AssistantEvent;
use crate::prompts::NORMAL_CHATBOT_PROMPT;
use crate::provider::LanguageModel;
use crate::sessions::SessionStore;
use crate::supervisor::{Supervisor, SupervisorOutcome, Worker};

/// A sensitive tool call waiting on a human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub worker: Worker,
    pub question: String,
    pub tool_call: ToolCall,
}

/// Complete durable state of one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorState {
    /// Shared conversation: user messages plus each responder's replies
    pub messages: Conversation,
    /// Worker the supervisor last routed to
    pub next: Option<Worker>,
    /// Calendar agent's private buffer
    pub calendar_msgs: Conversation,
    /// Gmail agent's private buffer
    pub gmail_msgs: Conversation,
    pub pending: Option<PendingInterrupt>,
}

pub struct Assistant {
    model: Arc<dyn LanguageModel>,
    supervisor: Supervisor,
    sessions: SessionStore,
}

impl Assistant {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        supervisor: Supervisor,
        sessions: SessionStore,
    ) -> Self {
        Self {
            model,
            supervisor,
            sessions,
        }
    }

    /// The session's pending review, if it is suspended
    pub fn pending(&self, session_id: &str) -> Result<Option<PendingInterrupt>> {
        Ok(self.sessions.load(session_id)?.and_then(|s| s.pending))
    }

    /// Handle one incoming user message. Returns the ordered events of the
    /// turn; a turn that hits a sensitive tool call ends with
    /// `ReviewRequested` instead of `TurnComplete`.
    pub async fn start(
        &self,
        session_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<Vec<AssistantEvent>> {
        let mut state = self.sessions.load(session_id)?.unwrap_or_default();
        if state.pending.is_some() {
            return Err(OrchestratorError::ReviewPending {
                session_id: session_id.to_string(),
            });
        }

        state.messages.push(Message::human(text));

        match classify(self.model.as_ref(), text).await {
            RequestKind::Normal => self.normal_turn(session_id, &mut state).await,
            RequestKind::Advanced => {
                info!("Routing message to supervisor for session {}", session_id);
                let before = state.messages.len();
                let outcome = self.supervisor.run(&mut state, user_id).await?;
                self.settle(session_id, state, before, outcome)
            }
        }
    }

    /// Apply a human review decision to the session's pending interrupt.
    /// With nothing pending, fails without touching stored state.
    pub async fn resume(
        &self,
        session_id: &str,
        user_id: &str,
        decision: ReviewDecision,
    ) -> Result<Vec<AssistantEvent>> {
        let mut state = self.sessions.load(session_id)?.unwrap_or_default();
        let Some(pending) = state.pending.take() else {
            return Err(OrchestratorError::InvalidResume {
                session_id: session_id.to_string(),
            });
        };

        info!(
            "Resuming session {} with decision on {}",
            session_id, pending.tool_call.name
        );
        let before = state.messages.len();
        let outcome = self
            .supervisor
            .resume(
                &mut state,
                user_id,
                pending.worker,
                &pending.tool_call,
                decision,
            )
            .await?;
        self.settle(session_id, state, before, outcome)
    }

    /// Plain chat: stream the answer over the shared history, then record it
    /// as the chatbot's reply.
    async fn normal_turn(
        &self,
        session_id: &str,
        state: &mut OrchestratorState,
    ) -> Result<Vec<AssistantEvent>> {
        let mut stream = self
            .model
            .chat_stream(state.messages.messages(), NORMAL_CHATBOT_PROMPT)
            .await
            .map_err(OrchestratorError::Provider)?;

        let mut events = Vec::new();
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment.map_err(OrchestratorError::Provider)?;
            answer.push_str(&fragment);
            events.push(AssistantEvent::TextToken {
                session_id: session_id.to_string(),
                text: fragment,
            });
        }

        state
            .messages
            .push(Message::assistant_authored("normal_chatbot", answer));
        self.sessions.save(session_id, state)?;
        events.push(AssistantEvent::TurnComplete {
            session_id: session_id.to_string(),
        });
        Ok(events)
    }

    /// Turn a supervisor outcome into events and persist the state
    fn settle(
        &self,
        session_id: &str,
        mut state: OrchestratorState,
        messages_before: usize,
        outcome: SupervisorOutcome,
    ) -> Result<Vec<AssistantEvent>> {
        let mut events = Vec::new();
        // Agent replies appended to the shared conversation during this
        // turn surface as text events
        for message in &state.messages.messages()[messages_before..] {
            if message.author.is_some() {
                events.push(AssistantEvent::TextToken {
                    session_id: session_id.to_string(),
                    text: message.content.clone(),
                });
            }
        }

        match outcome {
            SupervisorOutcome::Finished => {
                state.pending = None;
                self.sessions.save(session_id, &state)?;
                events.push(AssistantEvent::TurnComplete {
                    session_id: session_id.to_string(),
                });
            }
            SupervisorOutcome::Suspended {
                worker,
                question,
                tool_call,
            } => {
                state.pending = Some(PendingInterrupt {
                    worker,
                    question: question.clone(),
                    tool_call: tool_call.clone(),
                });
                self.sessions.save(session_id, &state)?;
                events.push(AssistantEvent::ReviewRequested {
                    session_id: session_id.to_string(),
                    tool_call,
                    prompt: question,
                });
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::SubAgent;
    use crate::provider::mock::ScriptedModel;
    use crate::provider::ModelReply;
    use crate::tools::{json_schema, ToolHandler, ToolRegistry, ToolSafety};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct StubTool {
        tool_name: &'static str,
        safety: ToolSafety,
    }

    #[async_trait]
    impl ToolHandler for StubTool {
        fn name(&self) -> &str {
            self.tool_name
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn input_schema(&self) -> Value {
            json_schema(json!({}), vec![])
        }
        fn safety(&self) -> ToolSafety {
            self.safety
        }
        async fn execute(&self, _input: Value) -> anyhow::Result<String> {
            Ok(format!("{} ran", self.tool_name))
        }
    }

    fn registry(sensitive: &'static str, safe: &'static str) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StubTool {
            tool_name: safe,
            safety: ToolSafety::Safe,
        }));
        registry.register(Arc::new(StubTool {
            tool_name: sensitive,
            safety: ToolSafety::Sensitive,
        }));
        registry
    }

    /// Assistant whose classifier/supervisor/agents all share one script
    fn assistant(replies: Vec<ModelReply>) -> Assistant {
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new(replies));
        let calendar = SubAgent::new(
            "calendar_agent",
            "calendar prompt",
            model.clone(),
            registry("create_calendar_event", "get_next_n_calendar_events"),
        );
        let gmail = SubAgent::new(
            "gmail_agent",
            "gmail prompt",
            model.clone(),
            registry("send_email", "fetch_inbox_messages"),
        );
        let supervisor = Supervisor::new(model.clone(), calendar, gmail);
        Assistant::new(model, supervisor, SessionStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_normal_chat_turn() {
        let assistant = assistant(vec![
            ModelReply::text(r#"{"classification": "normal"}"#),
            ModelReply::text("Hello! How can I help?"),
        ]);
        let events = assistant.start("s1", "u1", "hi there").await.unwrap();
        assert!(matches!(events[0], AssistantEvent::TextToken { .. }));
        assert!(matches!(
            events.last().unwrap(),
            AssistantEvent::TurnComplete { .. }
        ));

        // the answer landed in the shared history
        let state = assistant.sessions.load("s1").unwrap().unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(
            state.messages.messages()[1].author.as_deref(),
            Some("normal_chatbot")
        );
    }

    #[tokio::test]
    async fn test_advanced_turn_with_safe_tool() {
        let assistant = assistant(vec![
            // classifier
            ModelReply::text(r#"{"classification": "advanced"}"#),
            // supervisor -> calendar
            ModelReply::text(r#"{"next": "calendar_agent"}"#),
            // calendar agent: safe tool then reply
            ModelReply::tool(
                "",
                vec![ToolCall::new("get_next_n_calendar_events", json!({"n": 3}))],
            ),
            ModelReply::text("You have 3 events this week."),
            // supervisor -> FINISH
            ModelReply::text(r#"{"next": "FINISH"}"#),
        ]);
        let events = assistant
            .start("s1", "u1", "what's on my calendar?")
            .await
            .unwrap();

        let texts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AssistantEvent::TextToken { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["You have 3 events this week."]);
        assert!(matches!(
            events.last().unwrap(),
            AssistantEvent::TurnComplete { .. }
        ));

        let state = assistant.sessions.load("s1").unwrap().unwrap();
        assert!(state.pending.is_none());
        // private buffer kept the tool exchange out of the shared history
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.calendar_msgs.len(), 4);
    }

    #[tokio::test]
    async fn test_sensitive_tool_suspends_and_resumes() {
        let call = ToolCall::new("send_email", json!({"to_email": "a@b.c"}));
        let assistant = assistant(vec![
            ModelReply::text(r#"{"classification": "advanced"}"#),
            ModelReply::text(r#"{"next": "gmail_agent"}"#),
            ModelReply::tool("", vec![call.clone()]),
            // after approval
            ModelReply::text("The email is on its way."),
            ModelReply::text(r#"{"next": "FINISH"}"#),
        ]);

        let events = assistant
            .start("s1", "u1", "email alice for me")
            .await
            .unwrap();
        match events.last().unwrap() {
            AssistantEvent::ReviewRequested { prompt, tool_call, .. } => {
                assert_eq!(prompt, "Is this correct?");
                assert_eq!(tool_call.name, "send_email");
            }
            other => panic!("expected review request, got {:?}", other),
        }
        assert!(assistant.pending("s1").unwrap().is_some());

        let events = assistant
            .resume("s1", "u1", ReviewDecision::Continue)
            .await
            .unwrap();
        assert!(matches!(
            events.last().unwrap(),
            AssistantEvent::TurnComplete { .. }
        ));
        assert!(assistant.pending("s1").unwrap().is_none());

        let state = assistant.sessions.load("s1").unwrap().unwrap();
        assert!(state
            .gmail_msgs
            .messages()
            .iter()
            .any(|m| m.content == "send_email ran"));
    }

    #[tokio::test]
    async fn test_feedback_goes_back_to_agent() {
        let call = ToolCall::new("send_email", json!({"to_email": "wrong@b.c"}));
        let assistant = assistant(vec![
            ModelReply::text(r#"{"classification": "advanced"}"#),
            ModelReply::text(r#"{"next": "gmail_agent"}"#),
            ModelReply::tool("", vec![call.clone()]),
            ModelReply::text("Understood, I won't send it."),
            ModelReply::text(r#"{"next": "FINISH"}"#),
        ]);

        assistant.start("s1", "u1", "email alice").await.unwrap();
        assistant
            .resume(
                "s1",
                "u1",
                ReviewDecision::Feedback("wrong address, cancel it".to_string()),
            )
            .await
            .unwrap();

        let state = assistant.sessions.load("s1").unwrap().unwrap();
        let feedback = state
            .gmail_msgs
            .messages()
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some(call.id.as_str()))
            .unwrap();
        assert_eq!(feedback.content, "wrong address, cancel it");
    }

    #[tokio::test]
    async fn test_resume_without_pending_fails() {
        let assistant = assistant(vec![]);
        let err = assistant
            .resume("s1", "u1", ReviewDecision::Continue)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidResume { .. }));
    }

    #[tokio::test]
    async fn test_start_while_pending_fails() {
        let call = ToolCall::new("send_email", json!({}));
        let assistant = assistant(vec![
            ModelReply::text(r#"{"classification": "advanced"}"#),
            ModelReply::text(r#"{"next": "gmail_agent"}"#),
            ModelReply::tool("", vec![call]),
        ]);
        assistant.start("s1", "u1", "email alice").await.unwrap();
        let err = assistant.start("s1", "u1", "never mind").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ReviewPending { .. }));
    }

    #[tokio::test]
    async fn test_pending_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("sessions.db");
        let call = ToolCall::new("send_email", json!({"to_email": "a@b.c"}));

        {
            let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new(vec![
                ModelReply::text(r#"{"classification": "advanced"}"#),
                ModelReply::text(r#"{"next": "gmail_agent"}"#),
                ModelReply::tool("", vec![call.clone()]),
            ]));
            let calendar = SubAgent::new(
                "calendar_agent",
                "p",
                model.clone(),
                registry("create_calendar_event", "get_next_n_calendar_events"),
            );
            let gmail = SubAgent::new(
                "gmail_agent",
                "p",
                model.clone(),
                registry("send_email", "fetch_inbox_messages"),
            );
            let assistant = Assistant::new(
                model.clone(),
                Supervisor::new(model, calendar, gmail),
                SessionStore::open(&db).unwrap(),
            );
            assistant.start("s1", "u1", "email alice").await.unwrap();
        }

        // fresh process: only the approval script remains
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new(vec![
            ModelReply::text("Sent."),
            ModelReply::text(r#"{"next": "FINISH"}"#),
        ]));
        let calendar = SubAgent::new(
            "calendar_agent",
            "p",
            model.clone(),
            registry("create_calendar_event", "get_next_n_calendar_events"),
        );
        let gmail = SubAgent::new(
            "gmail_agent",
            "p",
            model.clone(),
            registry("send_email", "fetch_inbox_messages"),
        );
        let assistant = Assistant::new(
            model.clone(),
            Supervisor::new(model, calendar, gmail),
            SessionStore::open(&db).unwrap(),
        );

        let pending = assistant.pending("s1").unwrap().unwrap();
        assert_eq!(pending.tool_call.id, call.id);
        let events = assistant
            .resume("s1", "u1", ReviewDecision::Continue)
            .await
            .unwrap();
        assert!(matches!(
            events.last().unwrap(),
            AssistantEvent::TurnComplete { .. }
        ));
    }

    #[tokio::test]
    async fn test_routing_exhaustion_is_fatal() {
        // supervisor keeps naming an unknown worker
        let mut replies = vec![ModelReply::text(r#"{"classification": "advanced"}"#)];
        for _ in 0..9 {
            replies.push(ModelReply::text(r#"{"next": "weather_agent"}"#));
        }
        let assistant = assistant(replies);
        let err = assistant.start("s1", "u1", "do something").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::RoutingExhaustion { max_iterations: 8 }
        ));
    }
}
