//! Error taxonomy for the orchestration core
//!
//! Tool faults are caught at the invocation boundary and fed back to the
//! model as tool results; they never terminate a turn. Only model
//! unresponsiveness and routing exhaustion are terminal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A tool failed at the invocation boundary. Converted into a tool-role
    /// message by the sub-agent, never propagated out of a turn.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution { name: String, message: String },

    /// The model returned neither tool calls nor usable text, even after the
    /// bounded re-prompt loop.
    #[error("model produced no usable output after {attempts} attempts")]
    ModelOutput { attempts: u32 },

    /// The supervisor loop exceeded its iteration cap.
    #[error("supervisor exceeded {max_iterations} routing iterations")]
    RoutingExhaustion { max_iterations: u32 },

    /// Resume was called on a session with no pending review.
    #[error("no review is pending for session '{session_id}'")]
    InvalidResume { session_id: String },

    /// Start was called on a session that is suspended awaiting review.
    #[error("a review is pending for session '{session_id}'; resume it first")]
    ReviewPending { session_id: String },

    /// A tool-role message was appended that answers no pending tool call.
    #[error("tool result '{call_id}' does not answer a pending tool call")]
    StrayToolResult { call_id: String },

    /// The language-model provider itself failed (transport, auth, etc.).
    #[error("provider request failed: {0}")]
    Provider(#[source] anyhow::Error),

    /// The session store could not load or persist state.
    #[error("session store failure: {0}")]
    Session(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
