//! The automation pipeline: an LLM-driven step loop over a CDP session.

use crate::agent::action::execute_action;
use crate::agent::cdp::CdpClient;
use crate::agent::llm::{build_context_prompt, build_system_prompt, parse_decision, LlmClient};
use crate::agent::types::ChatMessage;
use crate::config::ServerConfig;
use crate::control::ControlState;
use crate::error::PipelineError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Maximum consecutive failures before the task is abandoned
const MAX_FAILURES: u32 = 3;

/// Maximum messages to keep in history (to avoid token limits)
const MAX_MESSAGES: usize = 30;

/// Callback invoked after each unit of pipeline progress with the step number
/// and the raw model payload for that step.
pub type StepCallback = Arc<dyn Fn(u32, &Value) + Send + Sync>;

/// The long-running automation pipeline behind the complex path.
///
/// Implementations must call `control.should_stop()` between units of work
/// and translate an observed stop into `PipelineError::Interrupted`.
#[async_trait]
pub trait AutomationPipeline: Send + Sync {
    async fn run(
        &self,
        instruction: &str,
        cdp_url: &str,
        target_id: Option<&str>,
        api_key: &str,
        on_step: StepCallback,
        control: Arc<ControlState>,
    ) -> Result<String, PipelineError>;
}

/// Trim message history to keep it within limits, always preserving the
/// system message.
fn trim_messages(messages: &mut Vec<ChatMessage>) {
    if messages.len() <= MAX_MESSAGES {
        return;
    }

    let system_msg = messages.first().filter(|m| m.role == "system").cloned();

    let keep_count = MAX_MESSAGES - 1;
    let start_idx = messages.len() - keep_count;

    let mut new_messages = Vec::with_capacity(MAX_MESSAGES);
    if let Some(system) = system_msg {
        new_messages.push(system);
    }
    new_messages.extend(messages.iter().skip(start_idx).cloned());

    *messages = new_messages;
    tracing::debug!("Trimmed message history to {} messages", messages.len());
}

/// Production pipeline: attach to the browser, loop DOM snapshot → model
/// decision → action until the model reports completion.
pub struct BrowserPipeline {
    config: Arc<RwLock<ServerConfig>>,
}

impl BrowserPipeline {
    pub fn new(config: Arc<RwLock<ServerConfig>>) -> Self {
        Self { config }
    }

    async fn run_steps(
        &self,
        client: &CdpClient,
        llm: &LlmClient,
        instruction: &str,
        max_steps: u32,
        on_step: &StepCallback,
        control: &ControlState,
    ) -> Result<String, PipelineError> {
        let mut messages = vec![
            ChatMessage::new("system", build_system_prompt()),
            ChatMessage::new("user", format!("My task is: {}", instruction)),
        ];

        let mut consecutive_failures = 0u32;

        for step in 1..=max_steps {
            // Cooperative checkpoint: blocks while paused, reports stops
            if control.should_stop().await {
                tracing::info!("Stop observed at step {}", step);
                return Err(PipelineError::Interrupted);
            }

            let dom = match client.get_dom_context().await {
                Ok(ctx) => ctx,
                Err(e) => {
                    tracing::warn!("Failed to get page snapshot: {}", e);
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_FAILURES {
                        return Err(PipelineError::Failed(format!(
                            "Failed to read page state: {}",
                            e
                        )));
                    }
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            messages.push(ChatMessage::new(
                "user",
                build_context_prompt(instruction, &dom),
            ));
            trim_messages(&mut messages);

            let content = match llm.complete(&messages).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("Model call failed: {}", e);
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_FAILURES {
                        return Err(PipelineError::Failed(format!("Model call failed: {}", e)));
                    }
                    messages.pop();
                    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
                    continue;
                }
            };

            messages.push(ChatMessage::new("assistant", content.clone()));
            trim_messages(&mut messages);

            let decision = match parse_decision(&content) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Failed to parse model response: {}", e);
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_FAILURES {
                        return Err(PipelineError::Failed(format!(
                            "Unusable model response: {}",
                            e
                        )));
                    }
                    messages.pop();
                    continue;
                }
            };

            consecutive_failures = 0;

            on_step(step, &decision.raw);

            if decision.is_complete {
                let result = match decision.result {
                    Some(Value::String(s)) => s,
                    Some(v) => v.to_string(),
                    None => decision.reasoning,
                };
                return Ok(result);
            }

            match execute_action(client, &decision.action).await {
                Ok(result) => {
                    if !result.success {
                        consecutive_failures += 1;
                        messages.push(ChatMessage::new(
                            "user",
                            format!(
                                "The last action failed: {}. Please try a different approach.",
                                result.message
                            ),
                        ));
                        trim_messages(&mut messages);
                        if consecutive_failures >= MAX_FAILURES {
                            return Err(PipelineError::Failed(result.message));
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Action execution error: {}", e);
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_FAILURES {
                        return Err(PipelineError::Failed(e));
                    }
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        }

        Err(PipelineError::Failed(format!(
            "Task did not complete within {} steps",
            max_steps
        )))
    }
}

#[async_trait]
impl AutomationPipeline for BrowserPipeline {
    async fn run(
        &self,
        instruction: &str,
        cdp_url: &str,
        target_id: Option<&str>,
        api_key: &str,
        on_step: StepCallback,
        control: Arc<ControlState>,
    ) -> Result<String, PipelineError> {
        let (base_url, model, max_steps) = {
            let config = self.config.read();
            (
                config.agent.base_url.clone(),
                config.agent.model.clone(),
                config.agent.max_steps,
            )
        };

        let client = CdpClient::attach(cdp_url, target_id)
            .await
            .map_err(PipelineError::Failed)?;
        let llm = LlmClient::new(&base_url, api_key, &model);

        let result = self
            .run_steps(&client, &llm, instruction, max_steps, &on_step, &control)
            .await;

        // Release the browser connection on every exit path
        client.close().await;

        result
    }
}
