use skipper_lib::{api, config, state::AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration (never overwrite existing file on failure)
    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(
                "Failed to load config: {}. Using in-memory defaults (not saving).",
                e
            );
            config::ServerConfig::default()
        }
    };

    let host = config.host.clone();
    let port = config.port;
    let api_key = config.api_key.clone();

    let state = Arc::new(AppState::new(config));

    if state.resolve_api_key(None).is_none() {
        tracing::warn!(
            "No model API key in config or OPENAI_API_KEY. Agent features are disabled until a request supplies one."
        );
    }

    api::run_server(state, &host, port, api_key)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}
