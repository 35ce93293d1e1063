use crate::config::LLMConfig;
use crmpilot_llm::{Content, Message, ToolCall};
use serde::{Deserialize, Serialize};

/// Everything a turn needs, assembled by the HTTP layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    pub thread_id: String,
    pub user_id: String,
    pub agent: String,
    pub system_prompt: String,
    /// Messages already stored on the thread
    pub history: Vec<Message>,
    /// The new user message for this turn
    pub user_message: Message,
    pub llm_config: LLMConfig,
}

impl TurnInput {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        agent: impl Into<String>,
        user_message: Message,
        llm_config: LLMConfig,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            agent: agent.into(),
            system_prompt: String::new(),
            history: Vec::new(),
            user_message,
            llm_config,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// Mutable state of one run.
///
/// `messages` holds the system prompt, the stored history and everything the
/// turn added. The slice from `new_messages_from` onwards is what gets
/// appended to the thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnState {
    pub thread_id: String,
    pub user_id: String,
    pub agent: String,
    pub run_id: String,
    pub messages: Vec<Message>,
    pub llm_config: LLMConfig,
    new_messages_from: usize,
}

impl TurnState {
    pub fn from_input(input: TurnInput) -> Self {
        let mut messages = Vec::with_capacity(input.history.len() + 2);
        if !input.system_prompt.is_empty() {
            messages.push(Message::system(input.system_prompt));
        }
        // a stored system message would duplicate the selected prompt
        messages.extend(
            input
                .history
                .into_iter()
                .filter(|m| !matches!(m, Message::System { .. })),
        );
        let new_messages_from = messages.len();
        messages.push(input.user_message);

        Self {
            thread_id: input.thread_id,
            user_id: input.user_id,
            agent: input.agent,
            run_id: uuid::Uuid::new_v4().to_string(),
            messages,
            llm_config: input.llm_config,
            new_messages_from,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        !self.pending_tool_calls().is_empty()
    }

    pub fn pending_tool_calls(&self) -> Vec<ToolCall> {
        self.last_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default()
    }

    pub fn add_tool_result(&mut self, tool_call_id: String, result: String) {
        self.messages.push(Message::Tool {
            tool_call_id,
            content: Content::text(result),
        });
    }

    /// Messages produced in this run, starting with the user message
    pub fn new_messages(&self) -> &[Message] {
        &self.messages[self.new_messages_from.min(self.messages.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> TurnInput {
        TurnInput::new("t1", "u1", "data-steward", Message::human("hi"), LLMConfig::default())
            .with_system_prompt("You are a data steward.")
            .with_history(vec![
                Message::system("stale prompt"),
                Message::human("earlier"),
                Message::ai("earlier answer"),
            ])
    }

    #[test]
    fn state_orders_prompt_history_then_user_message() {
        let state = TurnState::from_input(input());

        let roles: Vec<&str> = state.messages.iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(state.messages[0].text(), "You are a data steward.");
    }

    #[test]
    fn new_messages_start_at_user_message() {
        let mut state = TurnState::from_input(input());
        state.add_message(Message::ai_with_tools(None, vec![ToolCall::new("c1", "get_data", "{}")]));
        assert!(state.has_pending_tool_calls());
        state.add_tool_result("c1".into(), "[]".into());
        assert!(!state.has_pending_tool_calls());

        let new = state.new_messages();
        assert_eq!(new.len(), 3);
        assert_eq!(new[0].text(), "hi");
        assert_eq!(new[2].role(), "tool");
    }
}
