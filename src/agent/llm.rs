//! OpenAI-compatible chat-completion client and decision parsing.

use crate::agent::types::{AgentAction, ChatMessage, Decision, DomContext};
use reqwest::Client;
use serde_json::Value;

/// Chat-completion client for an OpenAI-compatible endpoint.
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Send a chat completion request and return the first choice's content.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, String> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": 4096,
            "temperature": 0.1
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("Model API error: {}", error_text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        Ok(content)
    }
}

/// Parse a model completion into a decision.
///
/// Tries the JSON object embedded in the completion first; models that don't
/// emit clean JSON get a keyword-inference fallback.
pub fn parse_decision(content: &str) -> Result<Decision, String> {
    let json_start = content.find('{');
    let json_end = content.rfind('}');

    if let (Some(start), Some(end)) = (json_start, json_end) {
        let json_str = &content[start..=end];
        if let Ok(raw) = serde_json::from_str::<Value>(json_str) {
            if let Ok(action) = serde_json::from_value::<AgentAction>(raw["action"].clone()) {
                return Ok(Decision {
                    action,
                    reasoning: raw["reasoning"].as_str().unwrap_or("").to_string(),
                    is_complete: raw["is_complete"].as_bool().unwrap_or(false),
                    next_goal: raw["next_goal"].as_str().map(str::to_string),
                    result: match &raw["result"] {
                        Value::Null => None,
                        v => Some(v.clone()),
                    },
                    raw,
                });
            }
        }
    }

    // Fallback for models that don't output clean JSON
    let action = if content.contains("navigate") || content.contains("go to") {
        let url = extract_url(content).unwrap_or_else(|| "about:blank".to_string());
        AgentAction::Navigate { url }
    } else if content.contains("click") {
        AgentAction::Click {
            selector: "button".to_string(),
        }
    } else if content.contains("type") || content.contains("enter") {
        AgentAction::Type {
            selector: "input".to_string(),
            text: "".to_string(),
        }
    } else {
        AgentAction::None
    };

    Ok(Decision {
        raw: serde_json::json!({
            "action": serde_json::to_value(&action).unwrap_or(Value::Null),
            "next_goal": Value::Null,
        }),
        action,
        reasoning: content.to_string(),
        is_complete: content.contains("complete")
            || content.contains("done")
            || content.contains("finished"),
        next_goal: None,
        result: None,
    })
}

/// Extract URL from text
pub fn extract_url(text: &str) -> Option<String> {
    let words = text.split_whitespace();
    for word in words {
        if word.starts_with("http://") || word.starts_with("https://") {
            return Some(
                word.trim_matches(|c: char| {
                    !c.is_alphanumeric() && c != ':' && c != '/' && c != '.' && c != '-'
                })
                .to_string(),
            );
        }
    }
    None
}

/// Build system prompt for the step loop
pub fn build_system_prompt() -> String {
    r##"You are a browser automation agent. Your task is to help users perform actions in a web browser.

You will receive information about the current page state (URL, title, interactive elements).

You must respond with a JSON object containing:
- action: The action to take (see below)
- reasoning: Why you chose this action
- next_goal: Short description of what you are trying to achieve next
- is_complete: Whether the task is complete
- result: (optional) Result text or data if the task is complete

Available actions:
1. Navigate to URL: {"type": "navigate", "url": "https://example.com"}
2. Click element: {"type": "click", "selector": "#button-id"}
3. Type text: {"type": "type", "selector": "#input-id", "text": "hello"}
4. Press key: {"type": "press_key", "key": "Enter"}
5. Scroll page: {"type": "scroll", "direction": "down", "amount": 300}
6. Wait: {"type": "wait", "duration_ms": 1000}
7. Extract data: {"type": "extract", "selectors": {"name": "#name"}}
8. Go back: {"type": "go_back"}
9. No action: {"type": "none"}

Selectors should use CSS selectors (e.g., #id, .class, tag, [attr=value]).

Be concise and focused. Complete the task efficiently. If the task is done, set is_complete to true."##
        .to_string()
}

/// Build user prompt with the current page snapshot
pub fn build_context_prompt(task: &str, dom: &DomContext) -> String {
    let elements_str = dom
        .elements
        .iter()
        .take(50)
        .map(|el| {
            format!(
                "- <{}> selector={} text={:?} clickable={}",
                el.tag,
                el.selector,
                el.text.as_deref().unwrap_or(""),
                el.clickable
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Task: {}\n\nCurrent page:\nURL: {}\nTitle: {}\n\nInteractive elements:\n{}\n\nWhat is the next action?",
        task,
        dom.url,
        dom.title.as_deref().unwrap_or(""),
        elements_str
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decision_json() {
        let content = r#"{"action": {"type": "navigate", "url": "https://example.com"}, "reasoning": "Need to go to example.com", "next_goal": "open the site", "is_complete": false}"#;
        let decision = parse_decision(content).unwrap();
        assert!(!decision.is_complete);
        assert_eq!(decision.next_goal.as_deref(), Some("open the site"));
        assert!(matches!(decision.action, AgentAction::Navigate { .. }));
        assert!(decision.raw.get("action").is_some());
    }

    #[test]
    fn test_parse_decision_text_fallback() {
        let content = "I should navigate to https://google.com to search";
        let decision = parse_decision(content).unwrap();
        assert!(!decision.is_complete);
        match decision.action {
            AgentAction::Navigate { url } => assert_eq!(url, "https://google.com"),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_parse_decision_complete() {
        let test_cases = vec![
            ("The task is complete now.", true),
            ("I am done with this task.", true),
            ("Still working on it.", false),
        ];

        for (content, expected_complete) in test_cases {
            let decision = parse_decision(content).unwrap();
            assert_eq!(
                decision.is_complete, expected_complete,
                "Failed for: {}",
                content
            );
        }
    }

    #[test]
    fn test_extract_url() {
        let text = "Navigate to https://example.com/page";
        assert_eq!(
            extract_url(text),
            Some("https://example.com/page".to_string())
        );
        assert_eq!(extract_url("Click the button"), None);
    }
}
