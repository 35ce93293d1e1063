use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{provider} API error ({status}): {message}")]
    Provider {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential refresh failed for {provider}: {reason}")]
    Refresh { provider: String, reason: String },

    #[error("Storage error: {0}")]
    Persist(#[from] crmpilot_persist::PersistError),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl ToolError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Turn a non-2xx provider response into a `ToolError::Provider`
pub(crate) async fn check_status(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ToolError::Provider {
        provider,
        status: status.as_u16(),
        message,
    })
}
