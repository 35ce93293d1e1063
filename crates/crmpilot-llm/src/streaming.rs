use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::buffer_utils::SseLineParser;

/// Incremental event produced while the model is streaming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text token delta
    Message {
        content: String,
    },

    /// Tool-call delta. The first delta for an index carries `id` and
    /// `name`; later ones append to `arguments`.
    ToolCall {
        index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

// Wire format of one `chat.completion.chunk`

#[derive(Debug, Clone, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ChatStreamChunk {
    pub fn into_stream_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        let Some(choice) = self.choices.into_iter().next() else {
            return events;
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                events.push(StreamEvent::Message { content });
            }
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            events.push(StreamEvent::ToolCall {
                index: tc.index,
                id: tc.id,
                name,
                arguments,
            });
        }

        if let Some(finish_reason) = choice.finish_reason {
            events.push(StreamEvent::Done {
                finish_reason: Some(finish_reason),
            });
        }

        events
    }
}

/// [`SseLineParser`] for the chat completions stream
pub struct ChatChunkParser;

impl SseLineParser for ChatChunkParser {
    fn parse_data_line(&self, data: &str) -> Result<Vec<StreamEvent>> {
        let chunk: ChatStreamChunk = serde_json::from_str(data)
            .map_err(|e| anyhow::anyhow!("Failed to parse chat chunk: {}", e))?;
        Ok(chunk.into_stream_events())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_utils::parse_sse_stream;
    use futures::StreamExt;

    fn chunks(parts: &[&str]) -> impl futures::Stream<Item = Result<Vec<u8>, std::io::Error>> {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(owned)
    }

    #[tokio::test]
    async fn test_text_deltas_and_done() {
        let body = [
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ];
        let events: Vec<StreamEvent> = parse_sse_stream(chunks(&body), ChatChunkParser)
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Message { content: "Hel".into() },
                StreamEvent::Message { content: "lo".into() },
                StreamEvent::Done { finish_reason: Some("stop".into()) },
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_call_deltas_split_mid_line() {
        let body = [
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",",
            "\"function\":{\"name\":\"get_data\",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{}\"}}]},\"finish_reason\":null}]}\n",
        ];
        let events: Vec<StreamEvent> = parse_sse_stream(chunks(&body), ChatChunkParser)
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            StreamEvent::ToolCall {
                index: 0,
                id: Some("call_1".into()),
                name: Some("get_data".into()),
                arguments: Some(String::new()),
            }
        );
        // stream ended without [DONE]; a synthetic Done closes it
        assert_eq!(events[2], StreamEvent::Done { finish_reason: None });
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_error() {
        let body = ["data: {not json}\n", "data: [DONE]\n"];
        let results: Vec<_> = parse_sse_stream(chunks(&body), ChatChunkParser).collect().await;
        assert!(results[0].is_err());
        assert!(matches!(results[1], Ok(StreamEvent::Done { .. })));
    }
}
