use anyhow::{anyhow, Result};
use crmpilot_llm::ChatClient;
use crmpilot_persist::{Stores, ThreadStore, UsageStore};
use crmpilot_types::TurnConfig;
use std::sync::Arc;

use crate::circuit_breaker::CircuitBreaker;
use crate::graph::Graph;

/// Builder for a [`Graph`]. The chat client and both stores are required.
pub struct GraphBuilder {
    chat_client: Option<Arc<dyn ChatClient>>,
    threads: Option<Arc<dyn ThreadStore>>,
    usage: Option<Arc<dyn UsageStore>>,
    config: TurnConfig,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            chat_client: None,
            threads: None,
            usage: None,
            config: TurnConfig::default(),
            breaker: None,
        }
    }

    pub fn chat_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.chat_client = Some(client);
        self
    }

    pub fn thread_store(mut self, store: Arc<dyn ThreadStore>) -> Self {
        self.threads = Some(store);
        self
    }

    pub fn usage_store(mut self, store: Arc<dyn UsageStore>) -> Self {
        self.usage = Some(store);
        self
    }

    /// Take the thread and usage stores from a shared [`Stores`] bundle
    pub fn stores(self, stores: &Stores) -> Self {
        self.thread_store(stores.threads.clone())
            .usage_store(stores.usage.clone())
    }

    pub fn config(mut self, config: TurnConfig) -> Self {
        self.config = config;
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn build(self) -> Result<Graph> {
        let client = self.chat_client.ok_or_else(|| anyhow!("Chat client is required"))?;
        let threads = self.threads.ok_or_else(|| anyhow!("Thread store is required"))?;
        let usage = self.usage.ok_or_else(|| anyhow!("Usage store is required"))?;

        Ok(Graph::new(
            client,
            threads,
            usage,
            self.config,
            self.breaker.unwrap_or_default(),
        ))
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
