//! Per-request routing: classify the instruction, then take the cheap direct
//! command path or hand off to the full agent pipeline.

use crate::agent::runner::run_task;
use crate::agent::stream::run_stream;
use crate::agent::types::{AgentEvent, TaskRequest};
use crate::state::AppState;
use futures::{pin_mut, Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;

/// Produce the event stream for one task request.
///
/// Fast path: `fast_navigate` with a target present runs one direct CDP
/// command and ends with a single `done`. No control state, no channel, no
/// background task. A failed direct command is a terminal `error`; it never
/// falls back to the agent pipeline. Everything else goes through the full
/// runner/supervisor pipeline.
pub fn dispatch(
    state: Arc<AppState>,
    req: TaskRequest,
    api_key: String,
) -> impl Stream<Item = AgentEvent> {
    async_stream::stream! {
        yield AgentEvent::Classifying {
            instruction: req.instruction.clone(),
        };

        let intent = match state.classifier.classify(&req.instruction, &api_key).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::error!("Intent classification failed: {}", e);
                yield AgentEvent::Error { message: e };
                return;
            }
        };

        yield AgentEvent::Classified {
            action: intent.action.clone(),
            params: Value::Object(intent.params.clone()),
        };

        if intent.action == "fast_navigate" && req.target_id.is_some() {
            let url = intent.url().unwrap_or_default().to_string();
            let target_id = req.target_id.as_deref().unwrap_or_default();

            yield AgentEvent::FastAction {
                action: "navigate".to_string(),
                url: url.clone(),
            };

            match state.commander.navigate(&req.cdp_url, target_id, &url).await {
                Ok(()) => {
                    yield AgentEvent::Done {
                        result: format!("Navigated to {}", url),
                    };
                }
                Err(e) => {
                    tracing::error!("Fast navigate failed: {}", e);
                    yield AgentEvent::Error { message: e };
                }
            }
        } else {
            let (task_id, control) = state.controls.register();
            yield AgentEvent::AgentStarting;

            let pipeline = state.pipeline.clone();
            let instruction = req.instruction.clone();
            let cdp_url = req.cdp_url.clone();
            let target_id = req.target_id.clone();
            let event_timeout = state.event_timeout();

            let inner = run_stream(
                state.controls.clone(),
                task_id,
                event_timeout,
                move |events| {
                    tokio::spawn(run_task(
                        pipeline,
                        instruction,
                        cdp_url,
                        target_id,
                        api_key,
                        events,
                        control,
                    ))
                },
            );
            pin_mut!(inner);
            while let Some(event) = inner.next().await {
                yield event;
            }
        }
    }
}
