use thiserror::Error;

/// Error kinds shared by every crate in the workspace. Crate-specific errors
/// (`RuntimeError`, `AlgorithmError`, `TrialError`, ...) wrap this one via
/// `#[from]` rather than duplicating the IO/serialization variants.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML serialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported file format for path: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
