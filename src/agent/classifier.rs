//! Intent classification: fast direct command vs full agent pipeline.

use crate::agent::llm::{extract_url, LlmClient};
use crate::agent::types::{ChatMessage, Intent};
use crate::config::ServerConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Classifies an instruction into an [`Intent`]. Model-backed in production,
/// stubbed in tests.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, instruction: &str, api_key: &str) -> Result<Intent, String>;
}

const CLASSIFY_PROMPT: &str = r#"You classify browser instructions.

Respond with one JSON object, nothing else:
- A plain navigation request ("open example.com", "go to https://...")
  becomes {"action": "fast_navigate", "params": {"url": "<full url>"}}.
- Anything that needs reading the page, filling forms, searching, or multiple
  steps becomes {"action": "agent_task", "params": {}}.

Always include the scheme in urls (default to https://)."#;

/// Model-backed classifier with a keyword fallback for unparseable output.
pub struct LlmClassifier {
    config: Arc<RwLock<ServerConfig>>,
}

impl LlmClassifier {
    pub fn new(config: Arc<RwLock<ServerConfig>>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(&self, instruction: &str, api_key: &str) -> Result<Intent, String> {
        let (base_url, model) = {
            let config = self.config.read();
            (config.agent.base_url.clone(), config.agent.model.clone())
        };

        let llm = LlmClient::new(&base_url, api_key, &model);
        let messages = vec![
            ChatMessage::new("system", CLASSIFY_PROMPT),
            ChatMessage::new("user", instruction),
        ];
        let content = llm.complete(&messages).await?;

        Ok(parse_intent(&content, instruction))
    }
}

/// Parse the classifier completion, falling back to a URL heuristic when the
/// model did not produce usable JSON.
pub fn parse_intent(content: &str, instruction: &str) -> Intent {
    let json_start = content.find('{');
    let json_end = content.rfind('}');
    if let (Some(start), Some(end)) = (json_start, json_end) {
        if let Ok(intent) = serde_json::from_str::<Intent>(&content[start..=end]) {
            if !intent.action.is_empty() {
                return intent;
            }
        }
    }
    fallback_intent(instruction)
}

fn fallback_intent(instruction: &str) -> Intent {
    let trimmed = instruction.trim();
    let lowered = trimmed.to_lowercase();

    let url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.to_string())
    } else if let Some(rest) = lowered
        .strip_prefix("open ")
        .or_else(|| lowered.strip_prefix("go to "))
    {
        // Bare site names only; anything with spaces needs the agent
        let site = rest.trim();
        if !site.is_empty() && !site.contains(' ') {
            extract_url(trimmed).or_else(|| Some(format!("https://{}", site)))
        } else {
            None
        }
    } else {
        None
    };

    match url {
        Some(url) => {
            let mut params = serde_json::Map::new();
            params.insert("url".to_string(), Value::String(url));
            Intent {
                action: "fast_navigate".to_string(),
                params,
            }
        }
        None => Intent {
            action: "agent_task".to_string(),
            params: serde_json::Map::new(),
        },
    }
}
