use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use teloxide::payloads::SetWebhookSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Recipient};
use tracing::{info, warn};

use super::{ChatTarget, IncomingMessage, ReplySink};
use crate::config::Config;

/// Greeting name used when the sender has no first name.
pub const DEFAULT_USER_NAME: &str = "there";

/// Telegram rejects messages over 4096 chars; leave some headroom.
const MAX_CHUNK_LEN: usize = 4000;

/// Split long messages for Telegram's 4096 char limit
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }
    // A chunk must hold at least one char (UTF-8 is at most 4 bytes).
    let max_len = max_len.max(4);

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Decide whether a raw webhook payload is a user text message.
///
/// Anything that is not a `message` with a chat id and non-empty `text`
/// (edited messages, callbacks, stickers, garbage) is ignored.
pub fn filter_update(payload: &Value) -> Option<IncomingMessage> {
    let message = payload.get("message")?;
    let chat_id = chat_target(message.get("chat")?.get("id")?)?;

    let text = message.get("text").and_then(Value::as_str)?;
    if text.is_empty() {
        return None;
    }

    let user_name = message
        .get("from")
        .and_then(|from| from.get("first_name"))
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(DEFAULT_USER_NAME)
        .to_string();

    Some(IncomingMessage {
        chat_id,
        user_name,
        text: text.to_string(),
    })
}

fn chat_target(id: &Value) -> Option<ChatTarget> {
    match id {
        Value::Number(n) => n.as_i64().map(ChatTarget::Id),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else if let Ok(id) = s.parse::<i64>() {
                Some(ChatTarget::Id(id))
            } else {
                Some(ChatTarget::Username(s.to_string()))
            }
        }
        _ => None,
    }
}

impl From<&ChatTarget> for Recipient {
    fn from(target: &ChatTarget) -> Self {
        match target {
            ChatTarget::Id(id) => Recipient::Id(ChatId(*id)),
            ChatTarget::Username(name) => Recipient::ChannelUsername(name.clone()),
        }
    }
}

/// Build the Bot API client with a bounded request timeout.
pub fn build_bot(config: &Config) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(config.llm.timeout_secs))
        .build()
        .context("Failed to build HTTP client for Telegram")?;

    let mut bot = Bot::with_client(&config.telegram.bot_token, client);
    if let Some(api_url) = &config.telegram.api_url {
        let url = reqwest::Url::parse(api_url)
            .with_context(|| format!("Invalid Telegram API URL: {}", api_url))?;
        bot = bot.set_api_url(url);
    }
    Ok(bot)
}

/// Point Telegram at our webhook. Failure is logged, not fatal.
pub async fn register_webhook(bot: &Bot, config: &Config) {
    let Some(webhook_url) = config.server.webhook_url() else {
        return;
    };

    let url = match reqwest::Url::parse(&webhook_url) {
        Ok(url) => url,
        Err(e) => {
            warn!("Not registering webhook, invalid URL {}: {}", webhook_url, e);
            return;
        }
    };

    let mut request = bot.set_webhook(url);
    if let Some(secret) = &config.telegram.webhook_secret {
        request = request.secret_token(secret.clone());
    }

    match request.await {
        Ok(_) => info!("Webhook registered at {}", webhook_url),
        Err(e) => warn!("Failed to register webhook at {}: {}", webhook_url, e),
    }
}

/// Sends replies through the Bot API `sendMessage` method.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplySink for TelegramSink {
    async fn send_text(&self, chat_id: &ChatTarget, text: &str) {
        for chunk in split_message(text, MAX_CHUNK_LEN) {
            if let Err(e) = self.bot.send_message(Recipient::from(chat_id), chunk).await {
                warn!("Failed to send message to chat {}: {}", chat_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_filter_plain_message() {
        let payload = json!({
            "update_id": 1,
            "message": {
                "message_id": 7,
                "from": { "id": 42, "first_name": "Ada" },
                "chat": { "id": 42, "type": "private" },
                "text": "What is Rust?"
            }
        });
        assert_eq!(
            filter_update(&payload),
            Some(IncomingMessage {
                chat_id: ChatTarget::Id(42),
                user_name: "Ada".to_string(),
                text: "What is Rust?".to_string(),
            })
        );
    }

    #[test]
    fn test_filter_ignores_non_messages() {
        assert_eq!(filter_update(&json!({ "update_id": 1 })), None);
        assert_eq!(
            filter_update(&json!({ "edited_message": { "chat": { "id": 1 }, "text": "x" } })),
            None
        );
        assert_eq!(filter_update(&json!([1, 2, 3])), None);
        assert_eq!(filter_update(&json!({ "message": "nope" })), None);
    }

    #[test]
    fn test_filter_ignores_missing_or_empty_text() {
        let photo = json!({ "message": { "chat": { "id": 5 }, "photo": [] } });
        let empty = json!({ "message": { "chat": { "id": 5 }, "text": "" } });
        assert_eq!(filter_update(&photo), None);
        assert_eq!(filter_update(&empty), None);
    }

    #[test]
    fn test_filter_keeps_whitespace_text() {
        let blank = json!({ "message": { "chat": { "id": 5 }, "text": "   " } });
        assert_eq!(filter_update(&blank).unwrap().text, "   ");
    }

    #[test]
    fn test_filter_requires_chat_id() {
        let payload = json!({ "message": { "chat": {}, "text": "hi" } });
        assert_eq!(filter_update(&payload), None);
    }

    #[test]
    fn test_filter_defaults_user_name() {
        let payload = json!({ "message": { "chat": { "id": -100123 }, "text": "hi" } });
        let incoming = filter_update(&payload).unwrap();
        assert_eq!(incoming.user_name, DEFAULT_USER_NAME);
        assert_eq!(incoming.chat_id, ChatTarget::Id(-100123));
    }

    #[test]
    fn test_chat_target_from_string() {
        assert_eq!(chat_target(&json!("123")), Some(ChatTarget::Id(123)));
        assert_eq!(
            chat_target(&json!("@news")),
            Some(ChatTarget::Username("@news".to_string()))
        );
        assert_eq!(chat_target(&json!("")), None);
        assert_eq!(chat_target(&json!(1.5)), None);
    }

    #[test]
    fn test_split_short_message() {
        assert_eq!(split_message("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_prefers_whitespace() {
        let chunks = split_message("aaaa bbbb cccc", 10);
        assert_eq!(chunks, vec!["aaaa bbbb ".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_with_tiny_limit_terminates() {
        let text = "日本語のテキスト";
        let chunks = split_message(text, 1);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn test_sink_posts_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex("(?i)^/bot123:abc/sendmessage$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": true })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".to_string();
        config.telegram.api_url = Some(server.uri());
        let sink = TelegramSink::new(build_bot(&config).unwrap());

        // The response body does not decode as a Message; the sink logs and moves on.
        sink.send_text(&ChatTarget::Id(42), "hello").await;

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["text"], "hello");
    }

    #[tokio::test]
    async fn test_sink_survives_unreachable_api() {
        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".to_string();
        config.telegram.api_url = Some("http://127.0.0.1:9".to_string());
        config.llm.timeout_secs = 2;
        let sink = TelegramSink::new(build_bot(&config).unwrap());

        let sent = tokio::time::timeout(
            Duration::from_secs(5),
            sink.send_text(&ChatTarget::Username("@news".to_string()), "hi"),
        )
        .await;
        assert!(sent.is_ok(), "send to an unreachable API should give up, not hang");
    }
}
