use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP API
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional API key required in the X-API-Key header.
    /// Health stays open so clients can probe the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Agent / model configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Event stream configuration
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
            agent: AgentConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Model provider settings for the classifier and the automation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Falls back to the OPENAI_API_KEY environment variable, and
    /// can be overridden per request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for classification and step decisions
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum pipeline steps before the task is abandoned
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_steps() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Seconds to wait for the next progress event before the stream is
    /// ended with a synthesized error and the worker is cancelled.
    #[serde(default = "default_event_timeout_secs")]
    pub event_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            event_timeout_secs: default_event_timeout_secs(),
        }
    }
}

fn default_event_timeout_secs() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.stream.event_timeout_secs, 120);
        assert_eq!(config.agent.max_steps, 50);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ServerConfig = toml::from_str("port = 9100\n").unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.agent.model, "gpt-4o-mini");
    }

    #[test]
    fn test_roundtrip() {
        let mut config = ServerConfig::default();
        config.agent.api_key = Some("sk-test".to_string());
        let text = toml::to_string_pretty(&config).unwrap();
        let back: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.agent.api_key.as_deref(), Some("sk-test"));
        assert_eq!(back.stream.event_timeout_secs, 120);
    }
}
