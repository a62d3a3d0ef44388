//! Supervisor: routes between the calendar and gmail agents until the
//! request is handled

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::{ReviewDecision, SubAgent, SubAgentOutcome};
use crate::conversation::{Conversation, Message, ToolCall};
use crate::error::{OrchestratorError, Result};
use crate::orchestrator::OrchestratorState;
use crate::prompts::SUPERVISOR_SYSTEM_PROMPT;
use crate::provider::{structured, LanguageModel};

/// Sub-agent addressable by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Worker {
    CalendarAgent,
    GmailAgent,
}

impl Worker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Worker::CalendarAgent => "calendar_agent",
            Worker::GmailAgent => "gmail_agent",
        }
    }
}

/// How one supervisor loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorOutcome {
    /// FINISH: every agent reply is already in the shared conversation
    Finished,
    /// A sub-agent suspended on a sensitive tool call
    Suspended {
        worker: Worker,
        question: String,
        tool_call: ToolCall,
    },
}

#[derive(Debug, Deserialize)]
struct RouterOutput {
    next: String,
}

/// Parsed routing verdict for one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteDecision {
    Worker(Worker),
    Finish,
    /// Parsed but named no known worker; costs an iteration and is re-asked
    Unknown,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Routing decisions per turn before the supervisor gives up
    pub max_iterations: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { max_iterations: 8 }
    }
}

pub struct Supervisor {
    model: Arc<dyn LanguageModel>,
    calendar: SubAgent,
    gmail: SubAgent,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(model: Arc<dyn LanguageModel>, calendar: SubAgent, gmail: SubAgent) -> Self {
        Self {
            model,
            calendar,
            gmail,
            config: SupervisorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    /// Route until FINISH or a suspension. Every routing decision, including
    /// one that names an unknown worker and gets re-asked, consumes one
    /// iteration of the cap.
    pub async fn run(
        &self,
        state: &mut OrchestratorState,
        user_id: &str,
    ) -> Result<SupervisorOutcome> {
        let mut iterations = 0u32;
        loop {
            iterations += 1;
            if iterations > self.config.max_iterations {
                return Err(OrchestratorError::RoutingExhaustion {
                    max_iterations: self.config.max_iterations,
                });
            }

            let worker = match self.decide(&state.messages).await? {
                RouteDecision::Finish => {
                    info!("Supervisor routed to FINISH");
                    state.next = None;
                    return Ok(SupervisorOutcome::Finished);
                }
                RouteDecision::Unknown => continue,
                RouteDecision::Worker(worker) => worker,
            };
            info!("Supervisor routed to {}", worker.as_str());
            state.next = Some(worker);

            match self.dispatch(worker, state, user_id).await? {
                SubAgentOutcome::Finished { reply } => {
                    state
                        .messages
                        .push(Message::authored(worker.as_str(), reply));
                }
                SubAgentOutcome::AwaitingReview { question, tool_call } => {
                    return Ok(SupervisorOutcome::Suspended {
                        worker,
                        question,
                        tool_call,
                    });
                }
            }
        }
    }

    /// Resume the suspended worker with the human's decision, then hand
    /// control back to the routing loop.
    pub async fn resume(
        &self,
        state: &mut OrchestratorState,
        user_id: &str,
        worker: Worker,
        reviewed: &ToolCall,
        decision: ReviewDecision,
    ) -> Result<SupervisorOutcome> {
        let (agent, buffer) = self.worker_parts(worker, state);
        let outcome = agent.resume(buffer, user_id, reviewed, decision).await?;
        match outcome {
            SubAgentOutcome::Finished { reply } => {
                state
                    .messages
                    .push(Message::authored(worker.as_str(), reply));
                self.run(state, user_id).await
            }
            SubAgentOutcome::AwaitingReview { question, tool_call } => {
                Ok(SupervisorOutcome::Suspended {
                    worker,
                    question,
                    tool_call,
                })
            }
        }
    }

    /// One routing decision over the shared conversation. Unknown worker
    /// names are re-asked by the caller's loop.
    async fn decide(&self, messages: &Conversation) -> Result<RouteDecision> {
        let verdict: RouterOutput = structured::ask(
            self.model.as_ref(),
            SUPERVISOR_SYSTEM_PROMPT,
            messages.messages(),
        )
        .await
        .map_err(OrchestratorError::Provider)?;

        match verdict.next.as_str() {
            "calendar_agent" => Ok(RouteDecision::Worker(Worker::CalendarAgent)),
            "gmail_agent" => Ok(RouteDecision::Worker(Worker::GmailAgent)),
            "FINISH" => Ok(RouteDecision::Finish),
            other => {
                warn!("Supervisor named unknown worker '{}', re-asking", other);
                Ok(RouteDecision::Unknown)
            }
        }
    }

    async fn dispatch(
        &self,
        worker: Worker,
        state: &mut OrchestratorState,
        user_id: &str,
    ) -> Result<SubAgentOutcome> {
        let latest = state.messages.last().cloned();
        let shared = state.messages.clone();
        let (agent, buffer) = self.worker_parts(worker, state);

        // First dispatch seeds the buffer with the whole shared history;
        // later dispatches append only the newest shared message.
        if buffer.is_empty() {
            *buffer = shared;
        } else if let Some(latest) = latest {
            buffer.push(latest);
        }

        agent.run(buffer, user_id).await
    }

    fn worker_parts<'a>(
        &'a self,
        worker: Worker,
        state: &'a mut OrchestratorState,
    ) -> (&'a SubAgent, &'a mut Conversation) {
        match worker {
            Worker::CalendarAgent => (&self.calendar, &mut state.calendar_msgs),
            Worker::GmailAgent => (&self.gmail, &mut state.gmail_msgs),
        }
    }
}
