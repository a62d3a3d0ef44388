//! Thin authenticated client for the Google REST APIs

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::CredentialProvider;

pub(crate) struct GoogleApi {
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl GoogleApi {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            credentials,
        }
    }

    async fn token(&self) -> Result<String> {
        self.credentials
            .access_token()
            .await
            .ok_or_else(|| anyhow!("no Google API credentials available"))
    }

    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let token = self.token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        Self::into_json(response).await
    }

    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        Self::into_json(response).await
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        let token = self.token().await?;
        let response = self
            .client
            .delete(url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("DELETE {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Google API returned {}: {}", status, text);
        }
        Ok(())
    }

    async fn into_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Google API returned {}: {}", status, text);
        }
        response
            .json()
            .await
            .context("Failed to parse Google API response")
    }
}
