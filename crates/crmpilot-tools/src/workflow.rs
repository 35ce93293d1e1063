use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::Sha256;

use crate::error::{check_status, Result, ToolError};
use crate::tool::{parse_args, CrmTool, ToolOutput};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-crmpilot-signature";

/// `trigger_workflow`: POST to the configured automation webhook.
///
/// When a signing secret is set, the body is signed as `sha256=<hex>` so the
/// receiver can verify it came from us.
pub struct TriggerWorkflowTool {
    http: reqwest::Client,
    webhook_url: String,
    secret: Option<String>,
    user_id: String,
}

impl TriggerWorkflowTool {
    pub fn new(
        http: reqwest::Client,
        webhook_url: impl Into<String>,
        secret: Option<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
            secret,
            user_id: user_id.into(),
        }
    }
}

pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ToolError::NotConfigured(format!("invalid webhook secret: {e}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[derive(Deserialize)]
struct TriggerArgs {
    workflow: String,
    #[serde(default)]
    inputs: Map<String, Value>,
}

#[async_trait]
impl CrmTool for TriggerWorkflowTool {
    fn name(&self) -> &str {
        "trigger_workflow"
    }

    fn description(&self) -> &str {
        "Trigger a named automation workflow with input values. Returns the workflow's response."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workflow": { "type": "string", "description": "Workflow name" },
                "inputs": { "type": "object", "description": "Input values for the workflow" }
            },
            "required": ["workflow"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: TriggerArgs = parse_args(arguments)?;
        if args.workflow.trim().is_empty() {
            return Err(ToolError::invalid("workflow must not be empty"));
        }

        let body = serde_json::to_vec(&json!({
            "workflow": args.workflow,
            "inputs": args.inputs,
            "user_id": self.user_id,
            "triggered_at": Utc::now().to_rfc3339(),
        }))
        .map_err(|e| ToolError::invalid(e.to_string()))?;

        let mut request = self
            .http
            .post(&self.webhook_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body)?);
        }

        let response = check_status("Workflow webhook", request.body(body).send().await?).await?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        Ok(ToolOutput::read(json!({
            "triggered": true,
            "workflow": args.workflow,
            "status": status,
            "response": payload,
        })))
    }
}
