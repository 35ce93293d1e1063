use anyhow::Context;
use crmpilot::persist::{Provider, StorageBackend};
use crmpilot::tools::{AgentProfile, OAuthClient};
use crmpilot::{CircuitBreaker, CrmPilot, OpenAIClient, StoresBuilder, ToolsConfig};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

/// Shared application state passed to all handlers
///
/// Built once at startup; every handle inside is cheap to clone and safe to
/// share across requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pilot: CrmPilot,
}

impl AppState {
    pub fn new(config: Config, pilot: CrmPilot) -> Self {
        Self {
            config: Arc::new(config),
            pilot,
        }
    }

    /// Connect storage, apply prompt overrides and wire the model client
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let backend: StorageBackend = config.storage.backend.parse()?;
        let mut stores = StoresBuilder::new()
            .backend(backend)
            .database(&config.storage.database);
        if let Some(uri) = &config.secrets.mongodb_uri {
            stores = stores.mongodb_uri(uri);
        }
        let stores = stores.build().await.context("failed to open storage")?;

        for (agent, prompt) in &config.agents {
            if agent.parse::<AgentProfile>().is_err() {
                tracing::warn!(agent = %agent, "prompt override for unknown agent");
            }
            stores.prompts.set_prompt(agent, prompt.clone()).await?;
        }

        let mut client = OpenAIClient::new(config.secrets.openai_api_key.clone())?;
        if let Some(base_url) = &config.llm.base_url {
            client = client.with_base_url(base_url);
        }

        let tools_config = ToolsConfig {
            salesforce_api_version: config.providers.salesforce_api_version.clone(),
            hubspot_api_base: config.providers.hubspot_api_base.clone(),
            google_calendar_base: config.providers.google_calendar_base.clone(),
            workflow_webhook_url: config.tools.workflow_webhook_url.clone(),
            workflow_secret: config.secrets.workflow_secret.clone(),
            search_api_url: config.tools.search_api_url.clone(),
            search_api_key: config.secrets.search_api_key.clone(),
        };

        let breaker = CircuitBreaker::new(
            config.circuit_breaker.threshold,
            Duration::from_secs(config.circuit_breaker.cooldown_secs),
        );

        let mut builder = CrmPilot::builder()
            .chat_client(Arc::new(client))
            .stores(stores)
            .tools_config(tools_config)
            .turn_config((&config.llm).into())
            .llm_config((&config.llm).into())
            .circuit_breaker(Arc::new(breaker));

        for (name, app) in &config.secrets.oauth {
            let provider: Provider = name.parse()?;
            builder = builder.oauth_client(
                provider,
                OAuthClient::new(config.providers.token_url(provider), &app.client_id, &app.client_secret),
            );
        }

        Ok(Self::new(config, builder.build()?))
    }
}
