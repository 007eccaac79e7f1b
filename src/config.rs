use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Completion backend, chosen once at startup.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    #[default]
    Openrouter,
    Openai,
    Ollama,
    /// OpenAI Responses API (`{model, input}`).
    Responses,
    /// Self-hosted endpoint taking `{prompt}` and answering `{reply}`.
    Custom,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Gemini => write!(f, "gemini"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Ollama => write!(f, "ollama"),
            LlmProvider::Responses => write!(f, "responses"),
            LlmProvider::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(LlmProvider::Gemini),
            "openrouter" => Ok(LlmProvider::Openrouter),
            "openai" => Ok(LlmProvider::Openai),
            "ollama" => Ok(LlmProvider::Ollama),
            "responses" => Ok(LlmProvider::Responses),
            "custom" => Ok(LlmProvider::Custom),
            other => bail!(
                "Unknown LLM provider '{}' (expected gemini, openrouter, openai, ollama, responses or custom)",
                other
            ),
        }
    }
}

impl LlmProvider {
    /// Local Ollama runs keyless; every hosted provider needs a key.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, LlmProvider::Ollama)
    }

    fn default_base_url(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Openai | LlmProvider::Responses => "https://api.openai.com/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
            LlmProvider::Custom => "",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-1.5-flash",
            LlmProvider::Openrouter => "openai/gpt-4o-mini",
            LlmProvider::Openai | LlmProvider::Responses => "gpt-4o-mini",
            LlmProvider::Ollama => "llama3",
            LlmProvider::Custom => "default",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: String::new(),
            base_url: String::new(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return self.base_url.trim_end_matches('/');
        }
        self.provider.default_base_url()
    }

    pub fn effective_model(&self) -> &str {
        if !self.model.is_empty() {
            return &self.model;
        }
        self.provider.default_model()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Expected value of the `X-Telegram-Bot-Api-Secret-Token` header.
    pub webhook_secret: Option<String>,
    /// Override for the Bot API root (local Bot API servers).
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub webhook_path: String,
    /// Public base URL; when set the webhook is registered with Telegram at startup.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_path: default_webhook_path(),
            public_url: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full URL Telegram should POST updates to, if a public URL is known.
    pub fn webhook_url(&self) -> Option<String> {
        self.public_url
            .as_deref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), self.webhook_path))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Build the configuration: defaults, then the TOML file, then the
    /// process environment. An explicitly named file must exist; the default
    /// `config.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse TOML text. Blank optional values count as unset, the same as
    /// blank environment variables.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.drop_blank_options();
        Ok(config)
    }

    fn drop_blank_options(&mut self) {
        for value in [
            &mut self.telegram.webhook_secret,
            &mut self.telegram.api_url,
            &mut self.llm.system_prompt,
            &mut self.server.public_url,
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }
    }

    /// Overlay environment variables. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = get("TELEGRAM_WEBHOOK_SECRET") {
            self.telegram.webhook_secret = Some(v);
        }
        if let Some(v) = get("TELEGRAM_API_URL") {
            self.telegram.api_url = Some(v);
        }
        if let Some(v) = get("LLM_PROVIDER") {
            self.llm.provider = v.parse()?;
        }
        if let Some(v) = get("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("LLM_MAX_TOKENS") {
            self.llm.max_tokens = v
                .trim()
                .parse()
                .with_context(|| format!("LLM_MAX_TOKENS is not a number: {}", v))?;
        }
        if let Some(v) = get("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = v
                .trim()
                .parse()
                .with_context(|| format!("LLM_TIMEOUT_SECS is not a number: {}", v))?;
        }
        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port: {}", v))?;
        }
        if let Some(v) = get("WEBHOOK_PATH") {
            self.server.webhook_path = v;
        }
        if let Some(v) = get("PUBLIC_URL") {
            self.server.public_url = Some(v);
        }

        Ok(())
    }

    /// Startup checks. Any failure here keeps the process from serving.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("TELEGRAM_BOT_TOKEN is missing");
        }
        if self.llm.provider.requires_api_key() && self.llm.api_key.trim().is_empty() {
            bail!("LLM_API_KEY is missing (required by provider '{}')", self.llm.provider);
        }
        if self.llm.effective_base_url().is_empty() {
            bail!("Provider '{}' needs an explicit base_url", self.llm.provider);
        }
        if self.llm.timeout_secs == 0 {
            bail!("LLM timeout must be at least one second");
        }

        let path = &self.server.webhook_path;
        if !path.starts_with('/') {
            bail!("Webhook path must start with '/': {}", path);
        }
        if path == "/" || path == "/health" {
            bail!("Webhook path {} collides with a status endpoint", path);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn with_credentials() -> Config {
        let mut config = Config::default();
        config
            .apply_env(env(&[("TELEGRAM_BOT_TOKEN", "123:abc"), ("LLM_API_KEY", "sk-test")]))
            .unwrap();
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.provider, LlmProvider::Openrouter);
        assert_eq!(config.llm.max_tokens, 1024);
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.webhook_path, "/webhook");
        assert_eq!(config.llm.effective_model(), "openai/gpt-4o-mini");
        assert_eq!(config.llm.effective_base_url(), "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_missing_bot_token_is_fatal() {
        let mut config = Config::default();
        config.apply_env(env(&[("LLM_API_KEY", "sk-test")])).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("TELEGRAM_BOT_TOKEN", "123:abc")]))
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("LLM_API_KEY"));
    }

    #[test]
    fn test_empty_env_values_are_unset() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("TELEGRAM_BOT_TOKEN", "  "), ("LLM_API_KEY", "k")]))
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ollama_runs_without_key() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("TELEGRAM_BOT_TOKEN", "t"), ("LLM_PROVIDER", "ollama")]))
            .unwrap();
        config.validate().unwrap();
        assert_eq!(config.llm.effective_base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_custom_provider_needs_base_url() {
        let mut config = with_credentials();
        config.apply_env(env(&[("LLM_PROVIDER", "custom")])).unwrap();
        assert!(config.validate().is_err());

        config
            .apply_env(env(&[("LLM_BASE_URL", "https://bot.example.com/chat/")]))
            .unwrap();
        config.validate().unwrap();
        assert_eq!(config.llm.effective_base_url(), "https://bot.example.com/chat");
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_toml(
            r#"
[telegram]
bot_token = "from-file"

[llm]
provider = "gemini"
api_key = "file-key"
max_tokens = 256

[server]
port = 9000
"#,
        )
        .unwrap();
        config
            .apply_env(env(&[("LLM_API_KEY", "env-key"), ("PORT", "8443")]))
            .unwrap();

        assert_eq!(config.telegram.bot_token, "from-file");
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.api_key, "env-key");
        assert_eq!(config.llm.max_tokens, 256);
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.llm.effective_model(), "gemini-1.5-flash");
        config.validate().unwrap();
    }

    #[test]
    fn test_blank_file_options_are_unset() {
        let config = Config::from_toml(
            r#"
[telegram]
bot_token = "t"
webhook_secret = ""
api_url = "  "

[server]
public_url = ""
"#,
        )
        .unwrap();
        assert_eq!(config.telegram.webhook_secret, None);
        assert_eq!(config.telegram.api_url, None);
        assert_eq!(config.server.public_url, None);
    }

    #[test]
    fn test_bad_numbers_are_rejected() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("PORT", "eighty")])).is_err());
        assert!(config.apply_env(env(&[("LLM_MAX_TOKENS", "-1")])).is_err());
    }

    #[test]
    fn test_unknown_provider() {
        let err = "anthropic".parse::<LlmProvider>().unwrap_err();
        assert!(err.to_string().contains("anthropic"));
        assert_eq!("Responses".parse::<LlmProvider>().unwrap(), LlmProvider::Responses);
    }

    #[test]
    fn test_webhook_path_validation() {
        let mut config = with_credentials();
        config.server.webhook_path = "webhook".to_string();
        assert!(config.validate().is_err());
        config.server.webhook_path = "/health".to_string();
        assert!(config.validate().is_err());
        config.server.webhook_path = "/tg/updates".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_webhook_url() {
        let mut config = with_credentials();
        assert_eq!(config.server.webhook_url(), None);
        config.server.public_url = Some("https://bot.example.com/".to_string());
        assert_eq!(
            config.server.webhook_url().as_deref(),
            Some("https://bot.example.com/webhook")
        );
    }
}
