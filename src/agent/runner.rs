//! Background task driver: turns pipeline progress into channel events and
//! terminates the stream with exactly one terminal event.

use crate::agent::engine::{AutomationPipeline, StepCallback};
use crate::agent::types::AgentEvent;
use crate::control::ControlState;
use crate::error::PipelineError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Runs `control.finish()` when dropped, so cleanup happens on every exit
/// path of the worker, including a forced abort.
struct FinishGuard(Arc<ControlState>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Drive one pipeline invocation to completion.
///
/// Pushes a `Step` event per pipeline step and then exactly one terminal
/// event: `Done` on success, `Stopped` on a cooperative interruption, `Error`
/// on anything else.
pub async fn run_task(
    pipeline: Arc<dyn AutomationPipeline>,
    instruction: String,
    cdp_url: String,
    target_id: Option<String>,
    api_key: String,
    events: UnboundedSender<AgentEvent>,
    control: Arc<ControlState>,
) {
    let _guard = FinishGuard(control.clone());

    let step_events = events.clone();
    let on_step: StepCallback = Arc::new(move |step, output| {
        let next_goal = output
            .get("next_goal")
            .and_then(Value::as_str)
            .map(str::to_string);
        let _ = step_events.send(AgentEvent::Step {
            step,
            next_goal,
            actions: summarize_actions(output),
        });
    });

    let outcome = pipeline
        .run(
            &instruction,
            &cdp_url,
            target_id.as_deref(),
            &api_key,
            on_step,
            control.clone(),
        )
        .await;

    let terminal = match outcome {
        Ok(result) => AgentEvent::Done { result },
        Err(PipelineError::Interrupted) => AgentEvent::Stopped {
            result: "Agent stopped by user".to_string(),
        },
        Err(e) => {
            tracing::error!("Agent task failed: {}", e);
            AgentEvent::Error {
                message: e.to_string(),
            }
        }
    };
    let _ = events.send(terminal);
}

/// Best-effort summary of the actions in a raw model step payload.
///
/// The payload shape is model-controlled, so this degrades in tiers:
/// structured object per action (null fields dropped) → a coarse label for
/// entries that are not objects → `None` when there is no usable action list,
/// in which case the `actions` field is omitted from the event.
pub fn summarize_actions(output: &Value) -> Option<Vec<Value>> {
    let raw = output.get("action").or_else(|| output.get("actions"))?;

    let entries: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![raw],
        _ => return None,
    };

    Some(
        entries
            .into_iter()
            .map(|entry| match entry {
                Value::Object(map) => {
                    let trimmed: serde_json::Map<String, Value> = map
                        .iter()
                        .filter(|(_, v)| !v.is_null())
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    Value::Object(trimmed)
                }
                Value::String(s) => Value::String(s.clone()),
                Value::Bool(_) => Value::String("bool".to_string()),
                Value::Number(_) => Value::String("number".to_string()),
                _ => Value::String("unknown".to_string()),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summarize_structured() {
        let output = json!({
            "next_goal": "search",
            "action": [{"type": "click", "selector": "#go", "text": null}]
        });
        let actions = summarize_actions(&output).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["type"], "click");
        // null fields are dropped from the summary
        assert!(actions[0].get("text").is_none());
    }

    #[test]
    fn test_summarize_single_object() {
        let output = json!({"action": {"type": "navigate", "url": "https://a.example"}});
        let actions = summarize_actions(&output).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["url"], "https://a.example");
    }

    #[test]
    fn test_summarize_label_fallback() {
        let output = json!({"action": ["click_button", 7]});
        let actions = summarize_actions(&output).unwrap();
        assert_eq!(actions[0], json!("click_button"));
        assert_eq!(actions[1], json!("number"));
    }

    #[test]
    fn test_summarize_omitted_on_unusable_payload() {
        assert!(summarize_actions(&json!({"next_goal": "x"})).is_none());
        assert!(summarize_actions(&json!({"action": "free text"})).is_none());
        assert!(summarize_actions(&json!(null)).is_none());
    }
}
