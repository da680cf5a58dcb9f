use crate::agent::classifier::{IntentClassifier, LlmClassifier};
use crate::agent::cdp::{CdpCommander, FastCommander};
use crate::agent::engine::{AutomationPipeline, BrowserPipeline};
use crate::config::ServerConfig;
use crate::control::ControlRegistry;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Application global state shared between the server and all handlers.
pub struct AppState {
    pub config: Arc<RwLock<ServerConfig>>,
    pub controls: Arc<ControlRegistry>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub commander: Arc<dyn FastCommander>,
    pub pipeline: Arc<dyn AutomationPipeline>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let config = Arc::new(RwLock::new(config));
        Self {
            classifier: Arc::new(LlmClassifier::new(config.clone())),
            commander: Arc::new(CdpCommander),
            pipeline: Arc::new(BrowserPipeline::new(config.clone())),
            controls: Arc::new(ControlRegistry::new()),
            config,
        }
    }

    /// Construct with explicit collaborators. Integration tests use this to
    /// substitute stubs for the model and the browser.
    pub fn with_services(
        config: ServerConfig,
        classifier: Arc<dyn IntentClassifier>,
        commander: Arc<dyn FastCommander>,
        pipeline: Arc<dyn AutomationPipeline>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            controls: Arc::new(ControlRegistry::new()),
            classifier,
            commander,
            pipeline,
        }
    }

    /// Resolve the model credential: request override, then config, then the
    /// OPENAI_API_KEY environment variable.
    pub fn resolve_api_key(&self, request_key: Option<&str>) -> Option<String> {
        if let Some(key) = request_key {
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
        if let Some(key) = self.config.read().agent.api_key.clone() {
            return Some(key);
        }
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.config.read().stream.event_timeout_secs)
    }
}
