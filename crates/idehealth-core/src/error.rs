use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdeHealthError {
    #[error("unknown error category: {0}")]
    InvalidCategory(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IdeHealthError>;
