//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `wa-gateway.toml`
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the TOML file is replaced with the environment value.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "wa-gateway.toml";

/// How inbound messages are answered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponderMode {
    /// Multi-turn assistant with a persisted thread per user
    #[default]
    Assistant,
    /// Stateless single-turn chat completion
    Chat,
}

impl ResponderMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "assistant" | "assistants" | "thread" => Some(Self::Assistant),
            "chat" | "completion" => Some(Self::Chat),
            _ => None,
        }
    }
}

/// OpenAI credentials and endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key
    pub api_key: String,

    /// Assistant used for runs; bootstrapped when absent
    pub assistant_id: Option<String>,

    /// Model the bootstrapped assistant is created with
    pub model: String,

    /// Base URL (optional, for proxies and tests)
    pub base_url: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            assistant_id: None,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

/// Assistant behaviour and bootstrap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub mode: ResponderMode,

    /// Name given to a bootstrapped assistant
    pub name: String,

    /// Instructions given to a bootstrapped assistant
    pub instructions: String,

    /// Reference document uploaded for file search during bootstrap
    pub reference_file: String,

    /// Model for chat mode
    pub chat_model: String,

    /// System prompt for chat mode
    pub system_prompt: String,

    /// Env file the bootstrapped assistant id is written to
    pub env_file: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            mode: ResponderMode::Assistant,
            name: "WhatsApp Real Estate Assistant".to_string(),
            instructions: "You are a smart real estate chatbot that helps users find the best properties..."
                .to_string(),
            reference_file: "data/data.csv".to_string(),
            chat_model: "gpt-4-1106-preview".to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
            env_file: ".env".to_string(),
        }
    }
}

/// WhatsApp Cloud API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub access_token: String,
    pub phone_number_id: String,

    /// Token expected in the `hub.verify_token` handshake (optional)
    pub verify_token: Option<String>,

    /// Graph API version segment, e.g. `v17.0`
    pub api_version: String,

    /// Port for the webhook server
    pub port: u16,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            verify_token: None,
            api_version: "v17.0".to_string(),
            port: 8000,
        }
    }
}

/// Thread store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadsConfig {
    /// Path to SQLite database file
    pub db_path: String,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            db_path: "data/threads.db".to_string(),
        }
    }
}

/// Run polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_secs: 120,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Main configuration for wa-gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub assistant: AssistantConfig,
    pub whatsapp: WhatsAppConfig,
    pub threads: ThreadsConfig,
    pub poller: PollerConfig,
}

impl Config {
    /// Replace `${VAR_NAME}` with the environment value (empty when unset)
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Parse TOML content (after env expansion) without applying overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `wa-gateway.toml` when present, otherwise from the environment only
    pub fn load() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }
        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup (environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Some(id) = non_empty("ASSISTANT_ID") {
            self.openai.assistant_id = Some(id);
        }
        if let Some(model) = non_empty("OPENAI_MODEL") {
            self.openai.model = model;
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.openai.base_url = Some(url);
        }

        if let Some(mode) = non_empty("RESPONDER_MODE").and_then(|m| ResponderMode::parse(&m)) {
            self.assistant.mode = mode;
        }
        if let Some(path) = non_empty("REFERENCE_FILE") {
            self.assistant.reference_file = path;
        }

        if let Some(token) = non_empty("FACEBOOK_ACCESS_TOKEN") {
            self.whatsapp.access_token = token;
        }
        if let Some(id) = non_empty("FACEBOOK_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = id;
        }
        if let Some(token) = non_empty("WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = Some(token);
        }
        if let Some(port) = non_empty("PORT").and_then(|p| p.parse().ok()) {
            self.whatsapp.port = port;
        }

        if let Some(path) = non_empty("THREADS_DB_PATH") {
            self.threads.db_path = path;
        }

        if let Some(ms) = non_empty("RUN_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poller.interval_ms = ms;
        }
        if let Some(secs) = non_empty("RUN_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.poller.timeout_secs = secs;
        }
    }

    /// Check required settings
    pub fn validate(&self) -> Result<()> {
        if self.openai.api_key.trim().is_empty() {
            return Err(Error::Config("OPENAI_API_KEY not set".to_string()));
        }
        if self.poller.interval_ms == 0 {
            return Err(Error::Config("poller.interval_ms must be positive".to_string()));
        }
        if self.poller.timeout_secs == 0 {
            return Err(Error::Config("poller.timeout_secs must be positive".to_string()));
        }
        if self.poller.interval() >= self.poller.timeout() {
            return Err(Error::Config(format!(
                "poller.interval_ms ({}) must be shorter than poller.timeout_secs ({}s)",
                self.poller.interval_ms, self.poller.timeout_secs
            )));
        }
        Ok(())
    }

    /// Whether outbound WhatsApp delivery is configured
    pub fn whatsapp_enabled(&self) -> bool {
        !self.whatsapp.access_token.is_empty() && !self.whatsapp.phone_number_id.is_empty()
    }
}
