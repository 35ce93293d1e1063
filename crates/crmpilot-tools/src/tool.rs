use async_trait::async_trait;
use crmpilot_llm::Tool;
use crmpilot_persist::{Provider, UsageDelta};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, ToolError};

/// A function the model may call mid-conversation.
///
/// Tools are built per request, already bound to the caller's credentials.
#[async_trait]
pub trait CrmTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object
    fn parameters(&self) -> Value;

    /// Provider whose credential this tool is bound to, if any
    fn provider(&self) -> Option<Provider> {
        None
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput>;

    fn definition(&self) -> Tool {
        Tool::new(self.name(), self.description(), self.parameters())
    }
}

/// Result of a successful tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Value,
    /// CRM mutations to bill for this call
    pub usage: UsageDelta,
}

impl ToolOutput {
    pub fn read(content: Value) -> Self {
        Self {
            content,
            usage: UsageDelta::default(),
        }
    }

    pub fn mutation(content: Value, usage: UsageDelta) -> Self {
        Self { content, usage }
    }

    /// Text handed back to the model
    pub fn to_content_string(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Deserialize tool arguments into a typed struct
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| ToolError::invalid(e.to_string()))
}
