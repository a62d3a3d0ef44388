use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;

use concierge_core::tools::calendar::calendar_registry;
use concierge_core::tools::gmail::gmail_registry;
use concierge_core::{
    AnthropicModel, Assistant, AssistantEvent, CredentialProvider, FileCredentials,
    LanguageModel, ReviewDecision, SessionStore, StaticCredentials, SubAgent, SubAgentConfig,
    Supervisor, SupervisorConfig, ToolCall,
};
use concierge_core::prompts::{CALENDAR_AGENT_SYSTEM_PROMPT, GMAIL_AGENT_SYSTEM_PROMPT};
use concierge_memory::MemoryStore;
use config::ConciergeConfig;

#[derive(Parser)]
#[command(name = "concierge")]
#[command(version)]
#[command(about = "Concierge — a calendar and email assistant")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Resume an existing session by id
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Chat { session } => cmd_chat(&cli.config, session).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG).await?;
        println!("Created default config at {}", config_path.display());
    }
    println!("Edit {} to set your Anthropic API key.", config_path.display());
    Ok(())
}

fn cmd_config(path: &Option<PathBuf>) -> Result<()> {
    let config = ConciergeConfig::load(path.as_ref())?;
    println!("{:#?}", config);
    Ok(())
}

fn build_assistant(config: &ConciergeConfig) -> Result<Assistant> {
    let anthropic = &config.providers.anthropic;
    let model: Arc<dyn LanguageModel> = Arc::new(
        AnthropicModel::new(anthropic.api_key.clone(), Some(anthropic.model.clone()))
            .with_base_url(anthropic.base_url.clone())
            .with_max_tokens(anthropic.max_tokens),
    );

    let credentials: Arc<dyn CredentialProvider> = match &config.google.token_path {
        Some(path) => Arc::new(FileCredentials::new(path)),
        None => Arc::new(StaticCredentials::missing()),
    };

    let data_dir = &config.storage.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data dir: {}", data_dir.display()))?;
    let memory = Arc::new(
        MemoryStore::open(data_dir.join("memory")).context("Failed to open memory store")?,
    );
    let sessions = SessionStore::open(data_dir.join("sessions.db"))?;

    let agent_config = SubAgentConfig {
        max_empty_retries: config.assistant.max_empty_retries,
    };
    let calendar = SubAgent::new(
        "calendar_agent",
        CALENDAR_AGENT_SYSTEM_PROMPT,
        model.clone(),
        calendar_registry(credentials.clone()),
    )
    .with_config(agent_config.clone());
    let gmail = SubAgent::new(
        "gmail_agent",
        GMAIL_AGENT_SYSTEM_PROMPT,
        model.clone(),
        gmail_registry(credentials),
    )
    .with_config(agent_config)
    .with_memory(memory);

    let supervisor = Supervisor::new(model.clone(), calendar, gmail).with_config(
        SupervisorConfig {
            max_iterations: config.assistant.max_route_iterations,
        },
    );

    Ok(Assistant::new(model, supervisor, sessions))
}

async fn cmd_chat(config_path: &Option<PathBuf>, session: Option<String>) -> Result<()> {
    let config = ConciergeConfig::load(config_path.as_ref())?;
    let assistant = build_assistant(&config)?;
    let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
    let user_id = &config.assistant.user_id;
    info!("Starting chat session {}", session_id);

    if let Some(pending) = assistant.pending(&session_id)? {
        println!("{}", confirmation_message(&pending.tool_call));
    } else {
        println!("Session {} ready. Type 'exit' to quit.", session_id);
    }

    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let result = if assistant.pending(&session_id)?.is_some() {
            let decision = if line.eq_ignore_ascii_case("approve") {
                ReviewDecision::Continue
            } else {
                ReviewDecision::Feedback(line.to_string())
            };
            assistant.resume(&session_id, user_id, decision).await
        } else {
            assistant.start(&session_id, user_id, line).await
        };

        match result {
            Ok(events) => render_events(&events),
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

fn render_events(events: &[AssistantEvent]) {
    for event in events {
        match event {
            AssistantEvent::TextToken { text, .. } => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            AssistantEvent::ReviewRequested { tool_call, .. } => {
                println!("\n{}", confirmation_message(tool_call));
            }
            AssistantEvent::TurnComplete { .. } => println!(),
        }
    }
}

/// Per-tool summary shown before asking the user to approve or give feedback
fn confirmation_message(tool_call: &ToolCall) -> String {
    let args = &tool_call.args;
    let field = |name: &str| args[name].as_str().unwrap_or("(not set)");

    let summary = match tool_call.name.as_str() {
        "create_calendar_event" => format!(
            "New calendar event ready:\n\
             Calendar: {}\n\
             Title: {}\n\
             Location: {}\n\
             Time: {} -> {}\n\
             Description: {}",
            field("calendar_name"),
            field("title"),
            field("location"),
            field("start_time"),
            field("end_time"),
            field("description"),
        ),
        "delete_calendar_event" => format!(
            "Delete event {} from calendar '{}'?",
            field("event_id"),
            field("calendar_name"),
        ),
        "send_email" => format!(
            "Ready to send email:\n\
             To: {}\n\
             Subject: {}\n\
             Body: {}",
            field("to_email"),
            field("subject"),
            field("message_body"),
        ),
        other => format!("The assistant wants to run '{}' with {}", other, args),
    };

    format!(
        "{}\n\nType 'approve' to continue, or describe what to change.",
        summary
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_email_confirmation() {
        let call = ToolCall::new(
            "send_email",
            json!({
                "to_email": "alice@example.com",
                "subject": "Offsite",
                "message_body": "See you there"
            }),
        );
        let msg = confirmation_message(&call);
        assert!(msg.contains("To: alice@example.com"));
        assert!(msg.contains("Subject: Offsite"));
        assert!(msg.contains("approve"));
    }

    #[test]
    fn test_create_event_confirmation_with_missing_fields() {
        let call = ToolCall::new(
            "create_calendar_event",
            json!({
                "calendar_name": "Work",
                "title": "Standup",
                "start_time": "2026-03-01T09:00:00Z",
                "end_time": "2026-03-01T09:15:00Z"
            }),
        );
        let msg = confirmation_message(&call);
        assert!(msg.contains("Calendar: Work"));
        assert!(msg.contains("Location: (not set)"));
    }

    #[test]
    fn test_unknown_tool_confirmation_is_generic() {
        let call = ToolCall::new("mystery_tool", json!({"a": 1}));
        let msg = confirmation_message(&call);
        assert!(msg.contains("mystery_tool"));
    }
}
