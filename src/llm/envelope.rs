//! Request and response shapes for each provider dialect.
//!
//! Building a request body and reading a response body are pure functions of
//! JSON, kept apart from the HTTP plumbing in [`super::http`].

use serde::Serialize;
use serde_json::{json, Value};

use super::{ProviderError, UNKNOWN_ERROR};
use crate::config::LlmProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `{contents:[{parts:[{text}]}]}` → `candidates[0].content.parts[0].text`
    Gemini,
    /// `{model, messages, max_tokens}` → `choices[0].message.content`
    ChatCompletions,
    /// `{model, input}` → `output_text` or `output[0].content[0].text`
    Responses,
    /// `{prompt}` → `reply` or `message`
    Prompt,
}

/// How the API key travels with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    QueryKey,
    Bearer,
}

impl From<LlmProvider> for Envelope {
    fn from(provider: LlmProvider) -> Self {
        match provider {
            LlmProvider::Gemini => Envelope::Gemini,
            LlmProvider::Openrouter | LlmProvider::Openai | LlmProvider::Ollama => {
                Envelope::ChatCompletions
            }
            LlmProvider::Responses => Envelope::Responses,
            LlmProvider::Custom => Envelope::Prompt,
        }
    }
}

/// Everything a request body can be built from.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub max_tokens: u32,
    pub system_prompt: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

impl Envelope {
    pub fn auth(self) -> Auth {
        match self {
            Envelope::Gemini => Auth::QueryKey,
            _ => Auth::Bearer,
        }
    }

    pub fn endpoint(self, base_url: &str, model: &str) -> String {
        match self {
            Envelope::Gemini => format!("{}/models/{}:generateContent", base_url, model),
            Envelope::ChatCompletions => format!("{}/chat/completions", base_url),
            Envelope::Responses => format!("{}/responses", base_url),
            Envelope::Prompt => base_url.to_string(),
        }
    }

    pub fn request_body(self, request: &CompletionRequest<'_>) -> Value {
        match self {
            Envelope::Gemini => json!({
                "contents": [{ "parts": [{ "text": request.prompt }] }]
            }),
            Envelope::ChatCompletions => {
                let mut messages = Vec::with_capacity(2);
                if let Some(system) = request.system_prompt {
                    messages.push(ChatMessage {
                        role: "system",
                        content: system,
                    });
                }
                messages.push(ChatMessage {
                    role: "user",
                    content: request.prompt,
                });
                json!(ChatRequest {
                    model: request.model,
                    messages,
                    max_tokens: request.max_tokens,
                })
            }
            Envelope::Responses => json!({
                "model": request.model,
                "input": request.prompt,
            }),
            Envelope::Prompt => json!({ "prompt": request.prompt }),
        }
    }

    /// Pull the reply text out of a response body.
    ///
    /// A present success field wins over an error field. A success field
    /// with the wrong structure is a [`ProviderError::Parse`], not a fallback.
    pub fn parse(self, body: &Value) -> Result<String, ProviderError> {
        let text = match self {
            Envelope::Gemini => {
                if body.get("candidates").is_some() {
                    walk(
                        body,
                        &[
                            Seg::Key("candidates"),
                            Seg::Idx(0),
                            Seg::Key("content"),
                            Seg::Key("parts"),
                            Seg::Idx(0),
                            Seg::Key("text"),
                        ],
                    )?
                } else {
                    return Err(error_or_empty(body));
                }
            }
            Envelope::ChatCompletions => {
                if body.get("choices").is_some() {
                    walk(
                        body,
                        &[
                            Seg::Key("choices"),
                            Seg::Idx(0),
                            Seg::Key("message"),
                            Seg::Key("content"),
                        ],
                    )?
                } else {
                    return Err(error_or_empty(body));
                }
            }
            Envelope::Responses => {
                if let Some(text) = body.get("output_text").and_then(Value::as_str) {
                    text
                } else if body.get("output").is_some() {
                    walk(
                        body,
                        &[
                            Seg::Key("output"),
                            Seg::Idx(0),
                            Seg::Key("content"),
                            Seg::Idx(0),
                            Seg::Key("text"),
                        ],
                    )?
                } else {
                    return Err(error_or_empty(body));
                }
            }
            // No error field in this dialect.
            Envelope::Prompt => ["reply", "message"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str))
                .ok_or(ProviderError::Empty)?,
        };

        if text.trim().is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(text.to_string())
    }
}

enum Seg {
    Key(&'static str),
    Idx(usize),
}

/// Follow `path` down from `body` to a string, describing where it broke off.
fn walk<'a>(body: &'a Value, path: &[Seg]) -> Result<&'a str, ProviderError> {
    let mut current = body;
    let mut walked = String::new();

    for seg in path {
        let next = match seg {
            Seg::Key(key) => {
                if !walked.is_empty() {
                    walked.push('.');
                }
                walked.push_str(key);
                current.get(*key)
            }
            Seg::Idx(idx) => {
                walked.push_str(&format!("[{}]", idx));
                current.get(*idx)
            }
        };
        current = next.ok_or_else(|| ProviderError::Parse(format!("missing `{}`", walked)))?;
    }

    current
        .as_str()
        .ok_or_else(|| ProviderError::Parse(format!("`{}` is not a string", walked)))
}

/// `error` may be an object with `message`, a bare string, or absent.
fn error_or_empty(body: &Value) -> ProviderError {
    let message = match body.get("error") {
        None | Some(Value::Null) => return ProviderError::Empty,
        Some(Value::String(message)) => message.as_str(),
        Some(error) => error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ERROR),
    };

    if message.trim().is_empty() {
        ProviderError::Api(UNKNOWN_ERROR.to_string())
    } else {
        ProviderError::Api(message.to_string())
    }
}
