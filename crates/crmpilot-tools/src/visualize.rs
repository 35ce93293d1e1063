use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, ToolError};
use crate::tool::{parse_args, CrmTool, ToolOutput};

const CHART_TYPES: [&str; 4] = ["bar", "line", "pie", "table"];

/// `visualize_data`: validate and normalise a chart spec for the client to
/// render. Pure; no provider call.
pub struct VisualizeDataTool;

#[derive(Deserialize)]
struct VisualizeArgs {
    chart_type: String,
    title: String,
    data: Vec<Value>,
    #[serde(default)]
    x_key: Option<String>,
    #[serde(default)]
    y_keys: Vec<String>,
}

#[async_trait]
impl CrmTool for VisualizeDataTool {
    fn name(&self) -> &str {
        "visualize_data"
    }

    fn description(&self) -> &str {
        "Render query results as a chart (bar, line, pie) or table in the chat."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "chart_type": { "type": "string", "enum": CHART_TYPES },
                "title": { "type": "string" },
                "data": { "type": "array", "items": { "type": "object" } },
                "x_key": { "type": "string", "description": "Field used for the category axis" },
                "y_keys": { "type": "array", "items": { "type": "string" }, "description": "Numeric fields to plot" }
            },
            "required": ["chart_type", "title", "data"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: VisualizeArgs = parse_args(arguments)?;
        if !CHART_TYPES.contains(&args.chart_type.as_str()) {
            return Err(ToolError::invalid(format!("unsupported chart_type: {}", args.chart_type)));
        }
        if args.data.iter().any(|row| !row.is_object()) {
            return Err(ToolError::invalid("every data row must be an object"));
        }

        let first = args.data.first().and_then(Value::as_object);
        let x_key = args
            .x_key
            .or_else(|| first.and_then(|row| row.iter().find(|(_, v)| v.is_string()).map(|(k, _)| k.clone())));
        let y_keys = if args.y_keys.is_empty() {
            first
                .map(|row| row.iter().filter(|(_, v)| v.is_number()).map(|(k, _)| k.clone()).collect())
                .unwrap_or_default()
        } else {
            args.y_keys
        };

        if args.chart_type != "table" && (x_key.is_none() || y_keys.is_empty()) {
            return Err(ToolError::invalid("chart needs a category field and at least one numeric field"));
        }

        Ok(ToolOutput::read(json!({
            "chart": {
                "type": args.chart_type,
                "title": args.title,
                "x_key": x_key,
                "y_keys": y_keys,
                "data": args.data,
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn infers_axes_from_first_row() {
        let output = VisualizeDataTool
            .execute(json!({
                "chart_type": "bar",
                "title": "Accounts by industry",
                "data": [{"industry": "Retail", "count": 4}, {"industry": "Tech", "count": 7}]
            }))
            .await
            .unwrap();

        assert_eq!(output.content["chart"]["x_key"], "industry");
        assert_eq!(output.content["chart"]["y_keys"], json!(["count"]));
        assert!(!output.usage.is_mutation());
    }

    #[tokio::test]
    async fn rejects_unknown_chart_type() {
        let err = VisualizeDataTool
            .execute(json!({ "chart_type": "radar", "title": "x", "data": [] }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
