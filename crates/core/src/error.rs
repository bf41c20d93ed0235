use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("device connection error: {0}")]
    Connection(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to copy {path}: {source}")]
    Copy {
        path: String,
        source: std::io::Error,
    },

    #[error("fingerprint {0} is already recorded")]
    Conflict(String),

    #[error("fingerprint store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
