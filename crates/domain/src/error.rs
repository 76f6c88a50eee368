/// Shared error type used across all ensemble crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// A model provider failed. `status` carries the HTTP status when the
    /// provider returned a structured error body.
    #[error("provider {provider}: {message}")]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("operation canceled")]
    Canceled,

    #[error("tool {0}: {1}")]
    Tool(String, String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Construct a provider error without a structured status.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Construct a provider error from a structured HTTP status.
    pub fn provider_status(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Error::Provider {
            provider: provider.into(),
            status: Some(status),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
