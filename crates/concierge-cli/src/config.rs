use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConciergeConfig {
    pub assistant: AssistantConfig,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_max_empty_retries")]
    pub max_empty_retries: u32,
    #[serde(default = "default_max_route_iterations")]
    pub max_route_iterations: u32,
}

fn default_user_id() -> String {
    "default".to_string()
}
fn default_max_empty_retries() -> u32 {
    3
}
fn default_max_route_iterations() -> u32 {
    8
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            max_empty_retries: default_max_empty_retries(),
            max_route_iterations: default_max_route_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub anthropic: AnthropicConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Path to the token JSON written by an external OAuth flow
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the session db and memory store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("concierge")
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 7 {
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("concierge")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub const DEFAULT_CONFIG: &str = r#"# concierge configuration

[assistant]
user_id = "default"
max_empty_retries = 3
max_route_iterations = 8

[providers.anthropic]
api_key = ""
base_url = "https://api.anthropic.com"
model = "claude-sonnet-4-5"
max_tokens = 4096

[google]
# Path to the token JSON written by your Google OAuth flow
# token_path = "/home/you/.config/concierge/google-token.json"

[storage]
# data_dir = "/home/you/.local/share/concierge"
"#;

impl ConciergeConfig {
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let path = path.cloned().unwrap_or_else(default_config_path);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: ConciergeConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        Ok(config)
    }
}
