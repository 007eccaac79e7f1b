//! Completion providers.
//!
//! Every provider speaks one of the envelope dialects in [`envelope`] and is
//! reached through the [`CompletionProvider`] trait. [`CompletionClient`] sits
//! in front of the provider and turns every failure into a reply string, so
//! callers always get something they can send back to the chat.

pub mod envelope;
pub mod http;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::LlmConfig;

/// Reply used when the provider answered without text or error.
pub const NO_RESPONSE_REPLY: &str = "No response from AI.";

/// Placeholder for provider errors that carry no message.
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure, timeout, or an unreadable body.
    #[error("request failed: {0}")]
    Transport(String),
    /// The body was not JSON at all.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
    /// The provider reported an error object.
    #[error("{0}")]
    Api(String),
    /// A success field was present but did not have the expected structure.
    #[error("{0}")]
    Parse(String),
    /// Neither a success nor an error field.
    #[error("empty response")]
    Empty,
}

impl ProviderError {
    /// The text sent to the user in place of a completion.
    pub fn into_reply(self) -> String {
        match self {
            ProviderError::Transport(e) | ProviderError::InvalidBody(e) => {
                format!("AI request failed: {}", e)
            }
            ProviderError::Api(message) => format!("AI Error: {}", message),
            ProviderError::Parse(e) => format!("Error parsing AI response: {}", e),
            ProviderError::Empty => NO_RESPONSE_REPLY.to_string(),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// One stateless completion for `prompt`. The returned text is never empty.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Front door to the configured provider. Never fails.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider = self::http::HttpProvider::new(config)?;
        Ok(Self::new(Arc::new(provider)))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Ask the provider and normalize the outcome into a non-empty reply.
    pub async fn reply(&self, prompt: &str) -> String {
        match self.provider.complete(prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => NO_RESPONSE_REPLY.to_string(),
            Err(e) => {
                warn!("Completion via {} failed: {}", self.provider.name(), e);
                e.into_reply()
            }
        }
    }
}
