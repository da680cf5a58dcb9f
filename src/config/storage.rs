use crate::config::schema::ServerConfig;
use crate::error::{Result, SkipperError};
use std::fs;
use std::path::PathBuf;

/// Get the configuration file path based on platform
pub fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .map(|p| p.join("skipper"))
        .unwrap_or_else(|| PathBuf::from("."));
    config_dir.join("config.toml")
}

/// Load configuration from file, creating default if not exists
pub fn load_config() -> Result<ServerConfig> {
    let config_path = get_config_path();

    if !config_path.exists() {
        tracing::info!(
            "Config file not found at {:?}, creating default",
            config_path
        );
        return init_config();
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        SkipperError::Config(format!(
            "Failed to read config from {:?}: {}",
            config_path, e
        ))
    })?;

    let config: ServerConfig = toml::from_str(&content)?;

    tracing::info!("Loaded config from {:?}", config_path);
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &ServerConfig) -> Result<()> {
    let config_path = get_config_path();

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)?;
    fs::write(&config_path, content)?;

    tracing::debug!("Saved config to {:?}", config_path);
    Ok(())
}

/// Write a default configuration and return it
fn init_config() -> Result<ServerConfig> {
    let config = ServerConfig::default();
    if let Err(e) = save_config(&config) {
        tracing::warn!("Could not write default config: {}", e);
    }
    Ok(config)
}
