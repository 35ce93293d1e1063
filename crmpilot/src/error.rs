use crmpilot_persist::PersistError;
use crmpilot_tools::ToolError;
use thiserror::Error;

/// Why a turn could not be started. Once started, failures arrive on the
/// event stream instead.
#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Storage error: {0}")]
    Storage(#[from] PersistError),

    #[error("Tool setup failed: {0}")]
    Tools(ToolError),
}

impl From<ToolError> for TurnError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::UnknownAgent(agent) => Self::UnknownAgent(agent),
            other => Self::Tools(other),
        }
    }
}

impl TurnError {
    /// Caused by the request rather than by the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnknownAgent(_) | Self::ThreadNotFound(_) | Self::EmptyMessage)
    }
}
