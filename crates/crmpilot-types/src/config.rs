use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard cap on model calls plus tool batches in one turn
pub const DEFAULT_MAX_STEPS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    pub max_steps: usize,
    /// Upper bound for a whole turn; `None` leaves it to the HTTP layer
    pub execution_timeout: Option<Duration>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            execution_timeout: None,
        }
    }
}

impl TurnConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LLMConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: Some(0.2),
            max_tokens: Some(4096),
        }
    }
}
