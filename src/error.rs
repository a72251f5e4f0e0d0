use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("API error: {status}")]
    Upstream { status: u16, message: String },

    #[error("Task text is empty")]
    EmptyTitle,

    #[error("Task not found: {0}")]
    UnknownTask(String),
}

pub type Result<T> = std::result::Result<T, Error>;
