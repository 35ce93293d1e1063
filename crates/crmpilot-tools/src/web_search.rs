use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{check_status, Result};
use crate::tool::{parse_args, CrmTool, ToolOutput};

pub const DEFAULT_SEARCH_URL: &str = "https://api.tavily.com/search";

/// `web_search`: query a hosted search API. Only offered when the client
/// asks for web search.
pub struct WebSearchTool {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl WebSearchTool {
    pub fn new(http: reqwest::Client, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

#[async_trait]
impl CrmTool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the public web. Returns titles, URLs and snippets."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "max_results": { "type": "integer", "minimum": 1, "maximum": 10, "default": 5 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: SearchArgs = parse_args(arguments)?;

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "query": args.query,
                "max_results": args.max_results.clamp(1, 10),
            }))
            .send()
            .await?;
        let body: Value = check_status("Web search", response).await?.json().await?;

        let results: Vec<Value> = body
            .get("results")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|r| {
                        json!({
                            "title": r.get("title").cloned().unwrap_or(Value::Null),
                            "url": r.get("url").cloned().unwrap_or(Value::Null),
                            "snippet": r.get("content").or_else(|| r.get("snippet")).cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ToolOutput::read(json!({ "query": args.query, "results": results })))
    }
}
