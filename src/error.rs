use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkipperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("Server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, SkipperError>;

/// Outcome signal of the automation pipeline. `Interrupted` marks a
/// cooperative stop observed at a checkpoint, as opposed to a real failure.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Agent stopped by user")]
    Interrupted,

    #[error("{0}")]
    Failed(String),
}
