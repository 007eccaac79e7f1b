/// Built-in commands answered without calling the completion provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    About,
}

const START_TEMPLATE: &str = "Hello, {name}! I'm an AI assistant. \
Send me any message and I'll reply.\n\n\
Commands:\n\
/help - How to use this bot\n\
/about - About this bot";

const HELP_TEMPLATE: &str = "Send me any text and I'll pass it to the AI \
and send back its answer.\n\n\
Commands:\n\
/start - Welcome message\n\
/help - Show this help\n\
/about - About this bot";

const ABOUT_TEMPLATE: &str = "I relay your messages to an AI completion \
service and send its reply back. Every message is answered on its own; \
no conversation history is kept.";

impl Command {
    pub const ALL: [Command; 3] = [Command::Start, Command::Help, Command::About];

    pub fn keyword(self) -> &'static str {
        match self {
            Command::Start => "/start",
            Command::Help => "/help",
            Command::About => "/about",
        }
    }

    /// Exact, case-sensitive match on the whole message text.
    pub fn parse(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.keyword() == text)
    }

    pub fn reply(self, display_name: &str) -> String {
        match self {
            Command::Start => START_TEMPLATE.replace("{name}", display_name),
            Command::Help => HELP_TEMPLATE.to_string(),
            Command::About => ABOUT_TEMPLATE.to_string(),
        }
    }
}
