use async_trait::async_trait;
use crmpilot_persist::{Provider, UsageDelta};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::error::{check_status, Result, ToolError};
use crate::tool::{parse_args, CrmTool, ToolOutput};

pub const DEFAULT_API_VERSION: &str = "59.0";

/// REST client bound to one user's Salesforce org
pub struct SalesforceClient {
    http: reqwest::Client,
    instance_url: String,
    access_token: String,
    api_version: String,
}

impl SalesforceClient {
    pub fn new(
        http: reqwest::Client,
        instance_url: impl Into<String>,
        access_token: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            http,
            instance_url: instance_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            api_version: api_version.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/services/data/v{}{}", self.instance_url, self.api_version, path)
    }

    pub async fn query(&self, soql: &str) -> Result<Value> {
        let response = self
            .http
            .get(self.url("/query"))
            .bearer_auth(&self.access_token)
            .query(&[("q", soql)])
            .send()
            .await?;
        Ok(check_status("Salesforce", response).await?.json().await?)
    }

    pub async fn create(&self, object: &str, fields: &Map<String, Value>) -> Result<Value> {
        let response = self
            .http
            .post(self.url(&format!("/sobjects/{object}/")))
            .bearer_auth(&self.access_token)
            .json(fields)
            .send()
            .await?;
        Ok(check_status("Salesforce", response).await?.json().await?)
    }

    /// PATCH one record; Salesforce answers 204 with no body
    pub async fn update(&self, object: &str, id: &str, fields: &Map<String, Value>) -> Result<()> {
        let response = self
            .http
            .patch(self.url(&format!("/sobjects/{object}/{id}")))
            .bearer_auth(&self.access_token)
            .json(fields)
            .send()
            .await?;
        check_status("Salesforce", response).await?;
        Ok(())
    }
}

fn validate_object_name(object: &str) -> Result<()> {
    let valid = !object.is_empty() && object.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ToolError::invalid(format!("invalid sObject name: {object}")))
    }
}

/// Salesforce record ids are 15 (case-sensitive) or 18 (case-safe) alphanumerics
fn validate_record_id(id: &str) -> Result<()> {
    let valid = matches!(id.len(), 15 | 18) && id.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(ToolError::invalid(format!("invalid Salesforce record id: {id}")))
    }
}

/// `get_data`: run a SOQL query
pub struct GetDataTool {
    client: Arc<SalesforceClient>,
}

impl GetDataTool {
    pub fn new(client: Arc<SalesforceClient>) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct GetDataArgs {
    query: String,
}

#[async_trait]
impl CrmTool for GetDataTool {
    fn name(&self) -> &str {
        "get_data"
    }

    fn description(&self) -> &str {
        "Query Salesforce records with a SOQL SELECT statement. Returns totalSize and records."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SOQL query, e.g. SELECT Id, Name FROM Account WHERE Industry = 'Retail' LIMIT 10"
                }
            },
            "required": ["query"]
        })
    }

    fn provider(&self) -> Option<Provider> {
        Some(Provider::Salesforce)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: GetDataArgs = parse_args(arguments)?;
        let query = args.query.trim();
        if !query.to_ascii_lowercase().starts_with("select") {
            return Err(ToolError::invalid("only SELECT queries are allowed"));
        }

        let result = self.client.query(query).await?;
        Ok(ToolOutput::read(json!({
            "totalSize": result.get("totalSize").cloned().unwrap_or(json!(0)),
            "records": result.get("records").cloned().unwrap_or(json!([])),
        })))
    }
}

/// `create_record`: insert one sObject record
pub struct CreateRecordTool {
    client: Arc<SalesforceClient>,
}

impl CreateRecordTool {
    pub fn new(client: Arc<SalesforceClient>) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct CreateRecordArgs {
    object: String,
    fields: Map<String, Value>,
}

#[async_trait]
impl CrmTool for CreateRecordTool {
    fn name(&self) -> &str {
        "create_record"
    }

    fn description(&self) -> &str {
        "Create a Salesforce record of the given sObject type (Account, Contact, Lead, Opportunity, ...)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "object": { "type": "string", "description": "sObject API name" },
                "fields": { "type": "object", "description": "Field API names to values" }
            },
            "required": ["object", "fields"]
        })
    }

    fn provider(&self) -> Option<Provider> {
        Some(Provider::Salesforce)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: CreateRecordArgs = parse_args(arguments)?;
        validate_object_name(&args.object)?;
        if args.fields.is_empty() {
            return Err(ToolError::invalid("fields must not be empty"));
        }

        let created = self.client.create(&args.object, &args.fields).await?;
        let id = created.get("id").cloned().unwrap_or(Value::Null);

        Ok(ToolOutput::mutation(
            json!({ "success": true, "object": args.object, "id": id }),
            UsageDelta::created(1).with_progress(format!("Created 1 {} record", args.object)),
        ))
    }
}

/// `update_records`: patch one or more records of one sObject type
pub struct UpdateRecordsTool {
    client: Arc<SalesforceClient>,
}

impl UpdateRecordsTool {
    pub fn new(client: Arc<SalesforceClient>) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct UpdateRecordsArgs {
    object: String,
    records: Vec<RecordUpdate>,
}

#[derive(Deserialize)]
struct RecordUpdate {
    id: String,
    fields: Map<String, Value>,
}

#[async_trait]
impl CrmTool for UpdateRecordsTool {
    fn name(&self) -> &str {
        "update_records"
    }

    fn description(&self) -> &str {
        "Update one or more Salesforce records of the same sObject type. Each entry needs the record Id and the fields to change."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "object": { "type": "string", "description": "sObject API name" },
                "records": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "fields": { "type": "object" }
                        },
                        "required": ["id", "fields"]
                    }
                }
            },
            "required": ["object", "records"]
        })
    }

    fn provider(&self) -> Option<Provider> {
        Some(Provider::Salesforce)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: UpdateRecordsArgs = parse_args(arguments)?;
        validate_object_name(&args.object)?;
        if args.records.is_empty() {
            return Err(ToolError::invalid("records must not be empty"));
        }
        for record in &args.records {
            validate_record_id(&record.id)?;
        }

        let mut updated = Vec::new();
        let mut failed = Vec::new();
        let mut last_error = None;
        for record in &args.records {
            match self.client.update(&args.object, &record.id, &record.fields).await {
                Ok(()) => updated.push(record.id.clone()),
                Err(e) => {
                    tracing::warn!(object = %args.object, id = %record.id, error = %e, "record update failed");
                    failed.push(json!({ "id": record.id, "error": e.to_string() }));
                    last_error = Some(e);
                }
            }
        }

        // nothing changed: let the model see the provider error
        if updated.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let n = updated.len() as u64;
        Ok(ToolOutput::mutation(
            json!({ "updated": updated, "failed": failed }),
            UsageDelta::updated(n).with_progress(format!("Updated {n} {} records", args.object)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_are_checked() {
        assert!(validate_object_name("Custom_Object__c").is_ok());
        assert!(validate_object_name("Account/../x").is_err());
        assert!(validate_object_name("").is_err());
    }

    #[test]
    fn record_ids_are_checked() {
        assert!(validate_record_id("001A00000000001").is_ok());
        assert!(validate_record_id("001A00000000001AAA").is_ok());
        assert!(validate_record_id("../User/005ADMIN").is_err());
        assert!(validate_record_id("001A0000000000%2F").is_err());
        assert!(validate_record_id("001A").is_err());
    }

    #[tokio::test]
    async fn non_select_query_is_rejected() {
        let client = Arc::new(SalesforceClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "t",
            DEFAULT_API_VERSION,
        ));
        let err = GetDataTool::new(client)
            .execute(json!({ "query": "DELETE FROM Account" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
