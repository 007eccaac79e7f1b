use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::envelope::{Auth, CompletionRequest, Envelope};
use super::{CompletionProvider, ProviderError};
use crate::config::LlmConfig;

/// A completion provider reached with a single JSON POST.
pub struct HttpProvider {
    client: reqwest::Client,
    name: String,
    envelope: Envelope,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: Option<String>,
}

impl HttpProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for the completion provider")?;

        let envelope = Envelope::from(config.provider);
        let model = config.effective_model().to_string();

        Ok(Self {
            client,
            name: config.provider.to_string(),
            envelope,
            endpoint: envelope.endpoint(config.effective_base_url(), &model),
            api_key: config.api_key.clone(),
            model,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone().filter(|s| !s.trim().is_empty()),
        })
    }
}

#[async_trait]
impl CompletionProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = self.envelope.request_body(&CompletionRequest {
            prompt,
            model: &self.model,
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt.as_deref(),
        });

        debug!("Sending request to {}: {}", self.name, self.endpoint);

        let mut request = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = match self.envelope.auth() {
                Auth::QueryKey => request.query(&[("key", self.api_key.as_str())]),
                Auth::Bearer => request.bearer_auth(&self.api_key),
            };
        }

        // The URL is dropped from transport errors: for Gemini it carries the key.
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        // Error envelopes arrive with 4xx/5xx statuses, so the body is read
        // regardless of the status code.
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        debug!("{} answered {} ({} bytes)", self.name, status, bytes.len());

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::InvalidBody(format!("HTTP {}: {}", status, e)))?;

        self.envelope.parse(&value)
    }
}
