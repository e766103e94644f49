use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx reply. `detail` is the server's `error` field when the body had one.
    #[error("chat backend returned status {status}")]
    Status { status: u16, detail: Option<String> },

    #[error("could not decode chat response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("config error: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
