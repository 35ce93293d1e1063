use crate::buffer_utils::parse_sse_stream;
use crate::streaming::ChatChunkParser;
use crate::traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, EventStream, TokenUsage};
use crate::types::{Content, ContentPart, Message, ToolCall};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completions client (plain HTTP, no SDK)
pub struct OpenAIClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    /// Point the client at another OpenAI-compatible endpoint (or a mock server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_chat_request(
        &self,
        model: &str,
        messages: Vec<Message>,
        options: &ChatOptions,
        stream: bool,
    ) -> Result<Value> {
        let messages: Vec<Value> = messages
            .into_iter()
            .map(|msg| self.convert_message(msg))
            .collect::<Result<Vec<_>>>()?;

        let mut request = Map::new();
        request.insert("model".to_string(), json!(model));
        request.insert("messages".to_string(), Value::Array(messages));
        request.insert("stream".to_string(), json!(stream));

        // reasoning models reject temperature and rename max_tokens
        let is_reasoning_model = model.starts_with("o1") || model.starts_with("gpt-5");

        if let Some(temp) = options.temperature {
            if !is_reasoning_model {
                request.insert("temperature".to_string(), json!(temp));
            }
        }
        if let Some(max_tokens) = options.max_tokens {
            let token_field = if is_reasoning_model {
                "max_completion_tokens"
            } else {
                "max_tokens"
            };
            request.insert(token_field.to_string(), json!(max_tokens));
        }
        if let Some(tools) = &options.tools {
            request.insert("tools".to_string(), serde_json::to_value(tools)?);
        }
        if let Some(tool_choice) = &options.tool_choice {
            request.insert("tool_choice".to_string(), serde_json::to_value(tool_choice)?);
        }

        Ok(Value::Object(request))
    }

    fn convert_message(&self, message: Message) -> Result<Value> {
        match message {
            Message::System { content } => Ok(json!({
                "role": "system",
                "content": self.convert_content(content),
            })),
            Message::Human { content } => Ok(json!({
                "role": "user",
                "content": self.convert_content(content),
            })),
            Message::AI { content, tool_calls } => {
                let mut map = Map::new();
                map.insert("role".to_string(), json!("assistant"));
                // content must be present (possibly null) next to tool_calls
                map.insert(
                    "content".to_string(),
                    content.map(|c| self.convert_content(c)).unwrap_or(Value::Null),
                );
                if let Some(tool_calls) = tool_calls.filter(|calls| !calls.is_empty()) {
                    map.insert("tool_calls".to_string(), serde_json::to_value(tool_calls)?);
                }
                Ok(Value::Object(map))
            }
            Message::Tool { tool_call_id, content } => Ok(json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": self.convert_content(content),
            })),
        }
    }

    fn convert_content(&self, content: Content) -> Value {
        match content {
            Content::Text(s) => json!(s),
            Content::Parts(parts) => Value::Array(
                parts
                    .into_iter()
                    .map(|ContentPart::Text { text }| json!({ "type": "text", "text": text }))
                    .collect(),
            ),
        }
    }

    async fn post_completions(&self, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(payload)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatClient for OpenAIClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let payload =
            self.build_chat_request(&request.model, request.messages, &request.options, false)?;

        tracing::debug!(model = %request.model, "chat completion request");
        let response = self.post_completions(&payload).await?;

        let raw: OpenAIChatResponse = response
            .json()
            .await
            .context("Failed to parse response")?;

        let choice = raw.choices.into_iter().next();
        let (content, tool_calls, finish_reason) = match choice {
            Some(c) => (c.message.content, c.message.tool_calls, c.finish_reason),
            None => (None, None, None),
        };

        Ok(ChatResponse {
            content,
            tool_calls,
            usage: raw.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason,
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        let payload =
            self.build_chat_request(&request.model, request.messages, &request.options, true)?;

        tracing::debug!(model = %request.model, "streaming chat completion request");
        let response = self.post_completions(&payload).await?;

        Ok(parse_sse_stream(response.bytes_stream(), ChatChunkParser))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tool;

    fn client() -> OpenAIClient {
        OpenAIClient::new("sk-test").unwrap()
    }

    #[test]
    fn test_build_request_with_tools() {
        let options = ChatOptions::new()
            .temperature(0.2)
            .tools(vec![Tool::new("get_data", "Query records", json!({"type": "object"}))]);

        let payload = client()
            .build_chat_request("gpt-4o", vec![Message::human("hi")], &options, true)
            .unwrap();

        assert_eq!(payload["stream"], json!(true));
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["tools"][0]["function"]["name"], "get_data");
        assert!((payload["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_reasoning_model_params() {
        let options = ChatOptions::new().temperature(0.5).max_tokens(100);
        let payload = client()
            .build_chat_request("gpt-5-mini", vec![Message::human("hi")], &options, false)
            .unwrap();

        assert!(payload.get("temperature").is_none());
        assert_eq!(payload["max_completion_tokens"], json!(100));
    }

    #[test]
    fn test_assistant_tool_call_message_has_null_content() {
        let msg = Message::ai_with_tools(None, vec![ToolCall::new("call_1", "get_data", "{}")]);
        let value = client().convert_message(msg).unwrap();

        assert_eq!(value["content"], Value::Null);
        assert_eq!(value["tool_calls"][0]["id"], "call_1");
        assert_eq!(value["tool_calls"][0]["type"], "function");
    }
}
