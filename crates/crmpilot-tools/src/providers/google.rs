use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use crmpilot_persist::{Provider, UsageDelta};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{check_status, Result, ToolError};
use crate::tool::{parse_args, CrmTool, ToolOutput};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar v3 client for the user's primary calendar
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    pub async fn insert_event(&self, event: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/calendars/primary/events", self.api_base))
            .bearer_auth(&self.access_token)
            .query(&[("sendUpdates", "all")])
            .json(event)
            .send()
            .await?;
        Ok(check_status("Google Calendar", response).await?.json().await?)
    }
}

pub struct BookMeetingTool {
    client: Arc<GoogleCalendarClient>,
}

impl BookMeetingTool {
    pub fn new(client: Arc<GoogleCalendarClient>) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct BookMeetingArgs {
    title: String,
    start: String,
    end: String,
    #[serde(default)]
    attendees: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    time_zone: Option<String>,
}

fn parse_time(field: &str, raw: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .map_err(|e| ToolError::invalid(format!("{field} is not an RFC 3339 timestamp: {e}")))
}

#[async_trait]
impl CrmTool for BookMeetingTool {
    fn name(&self) -> &str {
        "book_meeting"
    }

    fn description(&self) -> &str {
        "Book a meeting on the user's Google Calendar and invite attendees by email."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "start": { "type": "string", "description": "RFC 3339 start time, e.g. 2026-03-02T15:00:00-05:00" },
                "end": { "type": "string", "description": "RFC 3339 end time" },
                "attendees": { "type": "array", "items": { "type": "string", "format": "email" } },
                "description": { "type": "string" },
                "time_zone": { "type": "string", "description": "IANA zone, e.g. America/New_York" }
            },
            "required": ["title", "start", "end"]
        })
    }

    fn provider(&self) -> Option<Provider> {
        Some(Provider::Google)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: BookMeetingArgs = parse_args(arguments)?;
        let start = parse_time("start", &args.start)?;
        let end = parse_time("end", &args.end)?;
        if end <= start {
            return Err(ToolError::invalid("end must be after start"));
        }
        if let Some(bad) = args.attendees.iter().find(|a| !a.contains('@')) {
            return Err(ToolError::invalid(format!("invalid attendee email: {bad}")));
        }

        let mut event = json!({
            "summary": args.title,
            "start": { "dateTime": start.to_rfc3339() },
            "end": { "dateTime": end.to_rfc3339() },
            "attendees": args.attendees.iter().map(|email| json!({ "email": email })).collect::<Vec<_>>(),
        });
        if let Some(description) = args.description {
            event["description"] = json!(description);
        }
        if let Some(tz) = args.time_zone {
            event["start"]["timeZone"] = json!(tz);
            event["end"]["timeZone"] = json!(tz);
        }

        let created = self.client.insert_event(&event).await?;
        Ok(ToolOutput::mutation(
            json!({
                "success": true,
                "event_id": created.get("id").cloned().unwrap_or(Value::Null),
                "html_link": created.get("htmlLink").cloned().unwrap_or(Value::Null),
                "start": start.to_rfc3339(),
                "end": end.to_rfc3339(),
            }),
            UsageDelta::meetings(1).with_progress(format!("Booked meeting: {}", args.title)),
        ))
    }
}
