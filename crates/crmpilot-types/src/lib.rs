pub mod config;
pub mod events;
pub mod state;

pub use config::{LLMConfig, TurnConfig, DEFAULT_MAX_STEPS};
pub use events::{RunStatus, StreamEvent};
pub use state::{TurnInput, TurnState};
