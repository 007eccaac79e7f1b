pub mod telegram;

use async_trait::async_trait;

/// Where a reply goes. Telegram chats are addressed by numeric id, public
/// channels may also be addressed by `@username`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    Id(i64),
    Username(String),
}

impl std::fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{}", id),
            ChatTarget::Username(name) => write!(f, "{}", name),
        }
    }
}

/// A message received from the platform, already filtered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Destination for the reply
    pub chat_id: ChatTarget,
    /// Display name of the sender, or a placeholder
    pub user_name: String,
    /// The message text, never empty
    pub text: String,
}

/// Outbound side of a chat platform. Delivery is best effort.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_text(&self, chat_id: &ChatTarget, text: &str);
}
