//! Tool registry with safety classification
//!
//! Tools declare a name, description, argument schema, and whether they are
//! safe (read-only) or sensitive (side effects, require human approval).
//! Argument validation against the schema is each handler's job at execute
//! time; the orchestration core never inspects arguments.

pub mod calendar;
pub mod gmail;
mod google;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::OrchestratorError;

/// Safety classification of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSafety {
    /// Read-only; executable without approval
    Safe,
    /// External side effects; requires human approval before execution
    Sensitive,
}

/// Tool definition consumed by the language model
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Individual tool handler
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn safety(&self) -> ToolSafety;
    async fn execute(&self, input: Value) -> Result<String>;
}

/// Registry of the tools available to one sub-agent
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool handler
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        debug!("Registering tool: {}", name);
        self.tools.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for all registered tools (safe and sensitive alike);
    /// the model is bound to the full set
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|handler| ToolDefinition {
                name: handler.name().to_string(),
                description: handler.description().to_string(),
                input_schema: handler.input_schema(),
            })
            .collect()
    }

    /// Names of the sensitive tools in this registry
    pub fn sensitive_names(&self) -> HashSet<String> {
        self.tools
            .values()
            .filter(|h| h.safety() == ToolSafety::Sensitive)
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Whether the named tool is classified sensitive
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .map(|h| h.safety() == ToolSafety::Sensitive)
            .unwrap_or(false)
    }

    /// Execute a tool by name. Unknown tools and handler failures surface as
    /// `ToolExecution` errors for the caller's fallback wrapper.
    pub async fn execute(&self, name: &str, input: Value) -> Result<String, OrchestratorError> {
        debug!("Executing tool: {} with input: {:?}", name, input);

        let handler = self
            .tools
            .get(name)
            .ok_or_else(|| OrchestratorError::ToolExecution {
                name: name.to_string(),
                message: "unknown tool".to_string(),
            })?;

        handler.execute(input).await.map_err(|e| {
            warn!("Tool {} failed: {}", name, e);
            OrchestratorError::ToolExecution {
                name: name.to_string(),
                message: e.to_string(),
            }
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper to build a JSON schema for tool input
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
