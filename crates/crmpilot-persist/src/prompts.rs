use chrono::Utc;
use std::sync::Arc;

use crate::error::Result;
use crate::store::PromptStore;
use crate::templates::default_prompt;

/// Maps an agent to its system prompt: stored override first, then the
/// built-in default.
#[derive(Clone)]
pub struct PromptSelector {
    store: Arc<dyn PromptStore>,
}

impl PromptSelector {
    pub fn new(store: Arc<dyn PromptStore>) -> Self {
        Self { store }
    }

    /// `None` for an agent with neither an override nor a default
    pub async fn select(&self, agent: &str) -> Result<Option<String>> {
        let template = match self.store.get_prompt(agent).await? {
            Some(prompt) => prompt,
            None => match default_prompt(agent) {
                Some(prompt) => prompt.to_string(),
                None => return Ok(None),
            },
        };

        Ok(Some(render(&template)))
    }
}

fn render(template: &str) -> String {
    template.replace("{current_date}", &Utc::now().format("%Y-%m-%d").to_string())
}
