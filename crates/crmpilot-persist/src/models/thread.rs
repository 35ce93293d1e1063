use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{MessageRole, ThreadMessage};

const NAME_MAX_CHARS: usize = 60;

/// A conversation between one user and one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub user_id: String,
    pub agent: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Thread {
    pub fn new(user_id: impl Into<String>, agent: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            agent: agent.into(),
            name: None,
            messages: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Append in order and name the thread after its first user message
    pub fn append(&mut self, messages: Vec<ThreadMessage>) {
        if self.name.is_none() {
            self.name = derive_name(&messages);
        }
        self.messages.extend(messages);
        self.last_updated = Utc::now();
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id.clone(),
            agent: self.agent.clone(),
            name: self.name.clone(),
            message_count: self.messages.len(),
            last_updated: self.last_updated,
        }
    }
}

/// Thread name taken from the first non-empty user message, truncated on a
/// char boundary.
pub(crate) fn derive_name(messages: &[ThreadMessage]) -> Option<String> {
    let text = messages
        .iter()
        .find(|m| m.role == MessageRole::User && !m.content.trim().is_empty())?
        .content
        .trim();

    let mut name: String = text.chars().take(NAME_MAX_CHARS).collect();
    if text.chars().count() > NAME_MAX_CHARS {
        name.push('…');
    }
    Some(name)
}

/// Listing view without message bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub agent: String,
    pub name: Option<String>,
    pub message_count: usize,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_user_message_names_thread() {
        let mut thread = Thread::new("u1", "data-steward");
        thread.append(vec![ThreadMessage::user("Update 3 accounts"), ThreadMessage::assistant("ok")]);
        assert_eq!(thread.name.as_deref(), Some("Update 3 accounts"));

        thread.append(vec![ThreadMessage::user("something else")]);
        assert_eq!(thread.name.as_deref(), Some("Update 3 accounts"));
        assert_eq!(thread.messages.len(), 3);
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "é".repeat(100);
        let name = derive_name(&[ThreadMessage::user(long)]).unwrap();
        assert_eq!(name.chars().count(), NAME_MAX_CHARS + 1);
    }
}
