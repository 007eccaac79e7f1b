use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::commands::Command;
use crate::config::Config;
use crate::llm::CompletionClient;
use crate::platform::telegram::filter_update;
use crate::platform::ReplySink;

/// Shared application state. Immutable after startup.
pub struct AppState {
    pub config: Config,
    completion: CompletionClient,
    sink: Arc<dyn ReplySink>,
}

impl AppState {
    pub fn new(config: Config, completion: CompletionClient, sink: Arc<dyn ReplySink>) -> Self {
        Self {
            config,
            completion,
            sink,
        }
    }
}

/// Pick the reply for a message: a built-in command or a completion.
/// Always returns non-empty text.
pub async fn resolve_reply(completion: &CompletionClient, text: &str, display_name: &str) -> String {
    match Command::parse(text) {
        Some(cmd) => cmd.reply(display_name),
        None => completion.reply(text).await,
    }
}

/// Handle one webhook payload end to end. Returns the reply that was sent,
/// or `None` when the payload was ignored.
pub async fn handle_update(state: &AppState, payload: &Value) -> Option<String> {
    let Some(incoming) = filter_update(payload) else {
        debug!("Ignoring update without a text message");
        return None;
    };

    info!(
        "Message in chat {} ({} chars)",
        incoming.chat_id,
        incoming.text.chars().count()
    );
    debug!("Sender name: {}", incoming.user_name);

    let reply = resolve_reply(&state.completion, &incoming.text, &incoming.user_name).await;
    state.sink.send_text(&incoming.chat_id, &reply).await;

    Some(reply)
}
