use anyhow::{anyhow, Result};
use crmpilot_graph::{CircuitBreaker, Graph};
use crmpilot_llm::ChatClient;
use crmpilot_persist::{Provider, Stores};
use crmpilot_tools::{CredentialResolver, OAuthClient, ToolRegistry, ToolsConfig};
use crmpilot_types::{LLMConfig, TurnConfig};
use std::sync::Arc;

use crate::service::CrmPilot;

/// Builder for a [`CrmPilot`]. Only the chat client is required; storage
/// defaults to in-memory.
pub struct CrmPilotBuilder {
    chat_client: Option<Arc<dyn ChatClient>>,
    stores: Option<Stores>,
    http: Option<reqwest::Client>,
    tools_config: ToolsConfig,
    oauth_clients: Vec<(Provider, OAuthClient)>,
    turn_config: TurnConfig,
    llm_config: LLMConfig,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl CrmPilotBuilder {
    pub fn new() -> Self {
        Self {
            chat_client: None,
            stores: None,
            http: None,
            tools_config: ToolsConfig::default(),
            oauth_clients: Vec::new(),
            turn_config: TurnConfig::default(),
            llm_config: LLMConfig::default(),
            breaker: None,
        }
    }

    pub fn chat_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.chat_client = Some(client);
        self
    }

    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// HTTP client shared by provider tools and token refresh
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn tools_config(mut self, config: ToolsConfig) -> Self {
        self.tools_config = config;
        self
    }

    /// Register the OAuth app used to refresh `provider` tokens
    pub fn oauth_client(mut self, provider: Provider, client: OAuthClient) -> Self {
        self.oauth_clients.push((provider, client));
        self
    }

    pub fn turn_config(mut self, config: TurnConfig) -> Self {
        self.turn_config = config;
        self
    }

    pub fn llm_config(mut self, config: LLMConfig) -> Self {
        self.llm_config = config;
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn build(self) -> Result<CrmPilot> {
        let client = self.chat_client.ok_or_else(|| anyhow!("Chat client is required"))?;
        let stores = self.stores.unwrap_or_else(Stores::in_memory);
        let http = self.http.unwrap_or_default();

        let resolver = self
            .oauth_clients
            .into_iter()
            .fold(CredentialResolver::new(stores.credentials.clone(), http.clone()), |resolver, (provider, oauth)| {
                resolver.with_oauth_client(provider, oauth)
            });
        let registry = ToolRegistry::new(resolver, http, self.tools_config);

        let mut graph = Graph::builder()
            .chat_client(client)
            .stores(&stores)
            .config(self.turn_config);
        if let Some(breaker) = self.breaker {
            graph = graph.circuit_breaker(breaker);
        }

        Ok(CrmPilot::new(graph.build()?, registry, stores, self.llm_config))
    }
}

impl Default for CrmPilotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
