use serde::{Deserialize, Serialize};
use std::fmt;

/// Event relayed to the chat client while a turn runs.
///
/// Model deltas (`message`, `tool_call`, `done`) are forwarded from the LLM
/// stream; the rest are emitted by the turn executor itself. A stream always
/// starts with `init_stream` and ends with `end_stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    InitStream {
        run_id: String,
        thread_id: String,
        timestamp: i64,
    },

    /// Assistant text, token by token
    Message {
        content: String,
    },

    ToolCall {
        index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    ToolResult {
        tool_call_id: String,
        name: String,
        result: String,
        is_error: bool,
        duration_ms: u64,
    },

    /// One model call finished
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },

    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
    },

    EndStream {
        status: RunStatus,
        total_duration_ms: u64,
    },
}

impl From<crmpilot_llm::StreamEvent> for StreamEvent {
    fn from(event: crmpilot_llm::StreamEvent) -> Self {
        match event {
            crmpilot_llm::StreamEvent::Message { content } => Self::Message { content },
            crmpilot_llm::StreamEvent::ToolCall { index, id, name, arguments } => {
                Self::ToolCall { index, id, name, arguments }
            }
            crmpilot_llm::StreamEvent::Done { finish_reason } => Self::Done { finish_reason },
        }
    }
}

/// Terminal outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn end_stream_wire_shape() {
        let event = StreamEvent::EndStream {
            status: RunStatus::Failed,
            total_duration_ms: 12,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "end_stream", "status": "failed", "total_duration_ms": 12})
        );
    }

    #[test]
    fn llm_events_convert() {
        let event: StreamEvent = crmpilot_llm::StreamEvent::Message { content: "hi".into() }.into();
        assert_eq!(event, StreamEvent::Message { content: "hi".into() });
    }
}
