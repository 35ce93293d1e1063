use crmpilot_llm::Tool;
use crmpilot_persist::{Credential, Provider};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::credentials::CredentialResolver;
use crate::error::{Result, ToolError};
use crate::providers::{
    google, hubspot, salesforce, BookMeetingTool, CreateRecordTool, GetDataTool, GoogleCalendarClient,
    HubSpotClient, HubSpotCreateContactTool, HubSpotSearchTool, HubSpotUpdateContactTool, SalesforceClient,
    UpdateRecordsTool,
};
use crate::tool::{CrmTool, ToolOutput};
use crate::visualize::VisualizeDataTool;
use crate::web_search::{WebSearchTool, DEFAULT_SEARCH_URL};
use crate::workflow::TriggerWorkflowTool;

/// Persona that selects the system prompt and the tool subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentProfile {
    DataSteward,
    ProspectFinder,
    MeetingScheduler,
    WorkflowRunner,
}

impl AgentProfile {
    pub const ALL: [AgentProfile; 4] = [
        Self::DataSteward,
        Self::ProspectFinder,
        Self::MeetingScheduler,
        Self::WorkflowRunner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataSteward => "data-steward",
            Self::ProspectFinder => "prospect-finder",
            Self::MeetingScheduler => "meeting-scheduler",
            Self::WorkflowRunner => "workflow-runner",
        }
    }

    /// Tools this agent may use, before credential and flag filtering
    pub fn tool_names(&self) -> &'static [&'static str] {
        match self {
            Self::DataSteward => &[
                "get_data",
                "create_record",
                "update_records",
                "hubspot_search",
                "hubspot_create_contact",
                "hubspot_update_contact",
                "visualize_data",
            ],
            Self::ProspectFinder => &[
                "get_data",
                "create_record",
                "hubspot_search",
                "hubspot_create_contact",
                "web_search",
                "visualize_data",
            ],
            Self::MeetingScheduler => &["get_data", "hubspot_search", "book_meeting"],
            Self::WorkflowRunner => &["get_data", "hubspot_search", "trigger_workflow"],
        }
    }

    fn allows(&self, tool: &str) -> bool {
        self.tool_names().contains(&tool)
    }

    fn needs(&self, provider: Provider) -> bool {
        let tools: &[&str] = match provider {
            Provider::Salesforce => &["get_data", "create_record", "update_records"],
            Provider::HubSpot => &["hubspot_search", "hubspot_create_contact", "hubspot_update_contact"],
            Provider::Google => &["book_meeting"],
            Provider::Microsoft => &[],
        };
        tools.iter().any(|t| self.allows(t))
    }
}

impl fmt::Display for AgentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentProfile {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ToolError::UnknownAgent(s.to_string()))
    }
}

/// Tools bound for one request, keyed by name
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, Arc<dyn CrmTool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tool: Arc<dyn CrmTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn CrmTool>) -> Self {
        self.insert(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CrmTool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions advertised to the model, in name order
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Run `name` with the model's raw argument string
    pub async fn execute(&self, name: &str, raw_arguments: &str) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let arguments: Value = if raw_arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw_arguments)
                .map_err(|e| ToolError::invalid(format!("arguments are not valid JSON: {e}")))?
        };

        tool.execute(arguments).await
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet").field("tools", &self.names()).finish()
    }
}

/// Endpoints and keys for tools that are not bound to a user credential
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub salesforce_api_version: String,
    pub hubspot_api_base: String,
    pub google_calendar_base: String,
    pub workflow_webhook_url: Option<String>,
    pub workflow_secret: Option<String>,
    pub search_api_url: String,
    pub search_api_key: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            salesforce_api_version: salesforce::DEFAULT_API_VERSION.to_string(),
            hubspot_api_base: hubspot::DEFAULT_API_BASE.to_string(),
            google_calendar_base: google::DEFAULT_API_BASE.to_string(),
            workflow_webhook_url: None,
            workflow_secret: None,
            search_api_url: DEFAULT_SEARCH_URL.to_string(),
            search_api_key: None,
        }
    }
}

/// Builds per-request tool sets bound to the caller's credentials
#[derive(Clone)]
pub struct ToolRegistry {
    resolver: CredentialResolver,
    http: reqwest::Client,
    config: ToolsConfig,
}

impl ToolRegistry {
    pub fn new(resolver: CredentialResolver, http: reqwest::Client, config: ToolsConfig) -> Self {
        Self { resolver, http, config }
    }

    /// Assemble the tools `agent` may use for `user_id`.
    ///
    /// Tools whose credential is missing or cannot be refreshed are left
    /// out; only an unknown agent is an error.
    pub async fn build(&self, agent: &str, user_id: &str, web_search: bool) -> Result<ToolSet> {
        let profile: AgentProfile = agent.parse()?;

        let (salesforce, hubspot, google) = tokio::join!(
            self.resolve_if_needed(profile, user_id, Provider::Salesforce),
            self.resolve_if_needed(profile, user_id, Provider::HubSpot),
            self.resolve_if_needed(profile, user_id, Provider::Google),
        );

        let mut candidates = ToolSet::new();

        if let Some(Credential::Salesforce { access_token, instance_url, .. }) = salesforce {
            let client = Arc::new(SalesforceClient::new(
                self.http.clone(),
                instance_url,
                access_token,
                self.config.salesforce_api_version.clone(),
            ));
            candidates.insert(Arc::new(GetDataTool::new(client.clone())));
            candidates.insert(Arc::new(CreateRecordTool::new(client.clone())));
            candidates.insert(Arc::new(UpdateRecordsTool::new(client)));
        }

        if let Some(credential) = hubspot {
            let client = Arc::new(HubSpotClient::new(
                self.http.clone(),
                self.config.hubspot_api_base.clone(),
                credential.access_token(),
            ));
            candidates.insert(Arc::new(HubSpotSearchTool::new(client.clone())));
            candidates.insert(Arc::new(HubSpotCreateContactTool::new(client.clone())));
            candidates.insert(Arc::new(HubSpotUpdateContactTool::new(client)));
        }

        if let Some(credential) = google {
            let client = Arc::new(GoogleCalendarClient::new(
                self.http.clone(),
                self.config.google_calendar_base.clone(),
                credential.access_token(),
            ));
            candidates.insert(Arc::new(BookMeetingTool::new(client)));
        }

        if let Some(url) = &self.config.workflow_webhook_url {
            candidates.insert(Arc::new(TriggerWorkflowTool::new(
                self.http.clone(),
                url.clone(),
                self.config.workflow_secret.clone(),
                user_id,
            )));
        }

        if web_search {
            match &self.config.search_api_key {
                Some(key) => candidates.insert(Arc::new(WebSearchTool::new(
                    self.http.clone(),
                    self.config.search_api_url.clone(),
                    key.clone(),
                ))),
                None => tracing::warn!("web search requested but no search API key is configured"),
            }
        }

        candidates.insert(Arc::new(VisualizeDataTool));

        let mut tools = ToolSet::new();
        for name in profile.tool_names() {
            if let Some(tool) = candidates.get(name) {
                tools.insert(tool.clone());
            }
        }

        tracing::debug!(agent, user_id, tools = ?tools.names(), "tool set built");
        Ok(tools)
    }

    async fn resolve_if_needed(&self, profile: AgentProfile, user_id: &str, provider: Provider) -> Option<Credential> {
        if !profile.needs(provider) {
            return None;
        }
        self.resolver.resolve(user_id, provider).await
    }
}
