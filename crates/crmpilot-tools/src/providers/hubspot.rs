use async_trait::async_trait;
use crmpilot_persist::{Provider, UsageDelta};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::error::{check_status, Result, ToolError};
use crate::tool::{parse_args, CrmTool, ToolOutput};

pub const DEFAULT_API_BASE: &str = "https://api.hubapi.com";

const SEARCHABLE_OBJECTS: [&str; 3] = ["contacts", "companies", "deals"];

/// CRM v3 client bound to one user's HubSpot portal
pub struct HubSpotClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl HubSpotClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    pub async fn search(&self, object_type: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/crm/v3/objects/{object_type}/search", self.api_base))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        Ok(check_status("HubSpot", response).await?.json().await?)
    }

    pub async fn create_contact(&self, properties: &Map<String, Value>) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/crm/v3/objects/contacts", self.api_base))
            .bearer_auth(&self.access_token)
            .json(&json!({ "properties": properties }))
            .send()
            .await?;
        Ok(check_status("HubSpot", response).await?.json().await?)
    }

    pub async fn update_contact(&self, id: &str, properties: &Map<String, Value>) -> Result<Value> {
        let response = self
            .http
            .patch(format!("{}/crm/v3/objects/contacts/{id}", self.api_base))
            .bearer_auth(&self.access_token)
            .json(&json!({ "properties": properties }))
            .send()
            .await?;
        Ok(check_status("HubSpot", response).await?.json().await?)
    }
}

/// HubSpot object ids are numeric
fn validate_object_id(id: &str) -> Result<()> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ToolError::invalid(format!("invalid HubSpot contact id: {id}")))
    }
}

pub struct HubSpotSearchTool {
    client: Arc<HubSpotClient>,
}

impl HubSpotSearchTool {
    pub fn new(client: Arc<HubSpotClient>) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    #[serde(default = "default_object_type")]
    object_type: String,
    query: String,
    #[serde(default)]
    properties: Vec<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_object_type() -> String {
    "contacts".to_string()
}

fn default_limit() -> u32 {
    10
}

#[async_trait]
impl CrmTool for HubSpotSearchTool {
    fn name(&self) -> &str {
        "hubspot_search"
    }

    fn description(&self) -> &str {
        "Full-text search over HubSpot contacts, companies or deals."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "object_type": { "type": "string", "enum": SEARCHABLE_OBJECTS, "default": "contacts" },
                "query": { "type": "string" },
                "properties": { "type": "array", "items": { "type": "string" } },
                "limit": { "type": "integer", "minimum": 1, "maximum": 100, "default": 10 }
            },
            "required": ["query"]
        })
    }

    fn provider(&self) -> Option<Provider> {
        Some(Provider::HubSpot)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: SearchArgs = parse_args(arguments)?;
        if !SEARCHABLE_OBJECTS.contains(&args.object_type.as_str()) {
            return Err(ToolError::invalid(format!("unsupported object_type: {}", args.object_type)));
        }

        let mut body = json!({ "query": args.query, "limit": args.limit.clamp(1, 100) });
        if !args.properties.is_empty() {
            body["properties"] = json!(args.properties);
        }

        let result = self.client.search(&args.object_type, &body).await?;
        Ok(ToolOutput::read(json!({
            "total": result.get("total").cloned().unwrap_or(json!(0)),
            "results": result.get("results").cloned().unwrap_or(json!([])),
        })))
    }
}

pub struct HubSpotCreateContactTool {
    client: Arc<HubSpotClient>,
}

impl HubSpotCreateContactTool {
    pub fn new(client: Arc<HubSpotClient>) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct CreateContactArgs {
    properties: Map<String, Value>,
}

#[async_trait]
impl CrmTool for HubSpotCreateContactTool {
    fn name(&self) -> &str {
        "hubspot_create_contact"
    }

    fn description(&self) -> &str {
        "Create a HubSpot contact. Properties use HubSpot internal names (email, firstname, lastname, company, ...)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "properties": { "type": "object" }
            },
            "required": ["properties"]
        })
    }

    fn provider(&self) -> Option<Provider> {
        Some(Provider::HubSpot)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: CreateContactArgs = parse_args(arguments)?;
        if args.properties.is_empty() {
            return Err(ToolError::invalid("properties must not be empty"));
        }

        let created = self.client.create_contact(&args.properties).await?;
        Ok(ToolOutput::mutation(
            json!({ "success": true, "id": created.get("id").cloned().unwrap_or(Value::Null) }),
            UsageDelta::created(1).with_progress("Created 1 HubSpot contact"),
        ))
    }
}

pub struct HubSpotUpdateContactTool {
    client: Arc<HubSpotClient>,
}

impl HubSpotUpdateContactTool {
    pub fn new(client: Arc<HubSpotClient>) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct UpdateContactArgs {
    id: String,
    properties: Map<String, Value>,
}

#[async_trait]
impl CrmTool for HubSpotUpdateContactTool {
    fn name(&self) -> &str {
        "hubspot_update_contact"
    }

    fn description(&self) -> &str {
        "Update properties on an existing HubSpot contact by id."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "properties": { "type": "object" }
            },
            "required": ["id", "properties"]
        })
    }

    fn provider(&self) -> Option<Provider> {
        Some(Provider::HubSpot)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: UpdateContactArgs = parse_args(arguments)?;
        validate_object_id(&args.id)?;
        if args.properties.is_empty() {
            return Err(ToolError::invalid("properties must not be empty"));
        }

        self.client.update_contact(&args.id, &args.properties).await?;
        Ok(ToolOutput::mutation(
            json!({ "success": true, "id": args.id }),
            UsageDelta::updated(1).with_progress("Updated 1 HubSpot contact"),
        ))
    }
}
