use chrono::{DateTime, Utc};
use crmpilot_llm::{Content, Message, ToolCall};
use serde::{Deserialize, Serialize};

/// Stored conversation message. Immutable once appended to a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl ThreadMessage {
    fn new(role: MessageRole, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into())
    }

    /// Convert a model message for storage. System messages are not stored;
    /// the prompt is selected again on every turn.
    pub fn from_llm(message: &Message) -> Option<Self> {
        match message {
            Message::System { .. } => None,
            Message::Human { content } => Some(Self::new(MessageRole::User, content.as_text().into_owned())),
            Message::AI { content, tool_calls } => {
                let mut msg = Self::new(
                    MessageRole::Assistant,
                    content.as_ref().map(|c| c.as_text().into_owned()).unwrap_or_default(),
                );
                msg.tool_calls = tool_calls.clone().filter(|calls| !calls.is_empty());
                Some(msg)
            }
            Message::Tool { tool_call_id, content } => {
                let mut msg = Self::new(MessageRole::Tool, content.as_text().into_owned());
                msg.tool_call_id = Some(tool_call_id.clone());
                Some(msg)
            }
        }
    }
}

impl From<ThreadMessage> for Message {
    fn from(msg: ThreadMessage) -> Self {
        match msg.role {
            MessageRole::User => Message::Human {
                content: Content::text(msg.content),
            },
            MessageRole::Assistant => Message::AI {
                content: (!msg.content.is_empty()).then(|| Content::text(msg.content)),
                tool_calls: msg.tool_calls,
            },
            MessageRole::Tool => Message::Tool {
                tool_call_id: msg.tool_call_id.unwrap_or_default(),
                content: Content::text(msg.content),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_not_stored() {
        assert!(ThreadMessage::from_llm(&Message::system("prompt")).is_none());
    }

    #[test]
    fn tool_call_message_survives_storage() {
        let original = Message::ai_with_tools(
            None,
            vec![ToolCall::new("call_1", "update_records", r#"{"ids":["a"]}"#)],
        );

        let stored = ThreadMessage::from_llm(&original).unwrap();
        assert_eq!(stored.role, MessageRole::Assistant);
        assert_eq!(stored.content, "");

        let restored: Message = stored.into();
        assert_eq!(restored, original);
    }

    #[test]
    fn tool_result_keeps_call_id() {
        let stored = ThreadMessage::from_llm(&Message::tool_result("call_1", "ok")).unwrap();
        assert_eq!(stored.tool_call_id.as_deref(), Some("call_1"));

        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["role"], "tool");
    }
}
