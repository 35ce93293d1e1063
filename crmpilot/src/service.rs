use crmpilot_graph::Graph;
use crmpilot_llm::Message;
use crmpilot_persist::{PromptSelector, Stores, Thread};
use crmpilot_tools::{AgentProfile, ToolRegistry};
use crmpilot_types::{LLMConfig, StreamEvent, TurnInput};
use tokio::sync::mpsc;

use crate::builder::CrmPilotBuilder;
use crate::error::TurnError;

/// One chat message from a signed-in user
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: String,
    pub agent: String,
    /// Existing thread to continue; a new one is created when absent
    pub thread_id: Option<String>,
    pub message: String,
    pub web_search: bool,
}

impl TurnRequest {
    pub fn new(user_id: impl Into<String>, agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            agent: agent.into(),
            thread_id: None,
            message: message.into(),
            web_search: false,
        }
    }

    pub fn in_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }
}

/// A running turn
#[derive(Debug)]
pub struct StartedTurn {
    pub thread_id: String,
    pub events: mpsc::Receiver<StreamEvent>,
}

/// Entry point for chat turns: wires the prompt selector, the tool registry
/// and the thread store into the executor.
#[derive(Clone)]
pub struct CrmPilot {
    graph: Graph,
    registry: ToolRegistry,
    prompts: PromptSelector,
    stores: Stores,
    llm_config: LLMConfig,
}

impl CrmPilot {
    pub fn new(graph: Graph, registry: ToolRegistry, stores: Stores, llm_config: LLMConfig) -> Self {
        Self {
            graph,
            registry,
            prompts: PromptSelector::new(stores.prompts.clone()),
            stores,
            llm_config,
        }
    }

    pub fn builder() -> CrmPilotBuilder {
        CrmPilotBuilder::new()
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Create an empty thread for `agent`
    pub async fn create_thread(&self, user_id: &str, agent: &str) -> Result<Thread, TurnError> {
        let profile: AgentProfile = agent.parse()?;
        Ok(self.stores.threads.create_thread(user_id, profile.as_str()).await?)
    }

    /// Validate the request, gather prompt, tools and history, and start the
    /// turn. Nothing is written when this returns an error.
    pub async fn start_turn(&self, request: TurnRequest) -> Result<StartedTurn, TurnError> {
        let profile: AgentProfile = request.agent.parse()?;
        if request.message.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        // ownership first: building the tool set may refresh and store credentials
        let existing = self.load_thread(request.thread_id.as_deref(), &request.user_id).await?;

        let (tools, prompt) = tokio::join!(
            self.registry.build(profile.as_str(), &request.user_id, request.web_search),
            self.prompts.select(profile.as_str()),
        );
        let tools = tools?;
        let prompt = prompt?.unwrap_or_default();

        let thread = match existing {
            Some(thread) => thread,
            None => self.stores.threads.create_thread(&request.user_id, profile.as_str()).await?,
        };

        let history: Vec<Message> = thread.messages.into_iter().map(Message::from).collect();
        tracing::debug!(
            thread_id = %thread.id,
            agent = profile.as_str(),
            history = history.len(),
            tools = ?tools.names(),
            "starting turn"
        );

        let input = TurnInput::new(
            thread.id.clone(),
            request.user_id,
            profile.as_str(),
            Message::human(request.message),
            self.llm_config.clone(),
        )
        .with_system_prompt(prompt)
        .with_history(history);

        Ok(StartedTurn {
            thread_id: thread.id,
            events: self.graph.spawn_run(input, tools),
        })
    }

    async fn load_thread(&self, thread_id: Option<&str>, user_id: &str) -> Result<Option<Thread>, TurnError> {
        let Some(thread_id) = thread_id else {
            return Ok(None);
        };
        match self.stores.threads.get_thread(thread_id, user_id).await? {
            Some(thread) => Ok(Some(thread)),
            None => Err(TurnError::ThreadNotFound(thread_id.to_string())),
        }
    }
}
