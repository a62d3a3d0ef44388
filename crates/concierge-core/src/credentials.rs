//! Credential lookup for Google API tools
//!
//! Tools fetch a token at invoke time, so a missing or expired credential
//! shows up as a tool failure inside the conversation instead of blocking
//! the whole assistant.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::warn;

/// Source of Google API access tokens
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current access token, or None when no usable credential exists
    async fn access_token(&self) -> Option<String>;
}

/// Reads a token file written by an external OAuth flow. The file is a JSON
/// object with a `token` or `access_token` field; it is re-read on every
/// lookup so a refresh by the external flow is picked up without a restart.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialProvider for FileCredentials {
    async fn access_token(&self) -> Option<String> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read credential file {:?}: {}", self.path, e);
                return None;
            }
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Credential file {:?} is not valid JSON: {}", self.path, e);
                return None;
            }
        };
        value["token"]
            .as_str()
            .or_else(|| value["access_token"].as_str())
            .map(|t| t.to_string())
    }
}

/// Fixed token, for tests
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn missing() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_credentials_token_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"token": "ya29.abc"}"#).unwrap();
        let creds = FileCredentials::new(&path);
        assert_eq!(creds.access_token().await.as_deref(), Some("ya29.abc"));
    }

    #[tokio::test]
    async fn test_file_credentials_access_token_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token": "ya29.def"}"#).unwrap();
        let creds = FileCredentials::new(&path);
        assert_eq!(creds.access_token().await.as_deref(), Some("ya29.def"));
    }

    #[tokio::test]
    async fn test_missing_file_yields_none() {
        let creds = FileCredentials::new("/nonexistent/token.json");
        assert!(creds.access_token().await.is_none());
    }

    #[tokio::test]
    async fn test_static_credentials() {
        assert_eq!(
            StaticCredentials::new("t").access_token().await.as_deref(),
            Some("t")
        );
        assert!(StaticCredentials::missing().access_token().await.is_none());
    }
}
