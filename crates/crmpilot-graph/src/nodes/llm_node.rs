use crate::circuit_breaker::CircuitBreaker;
use crate::node::{emit, EventSender, Node, NodeType};
use anyhow::{bail, Result};
use async_trait::async_trait;
use crmpilot_llm::{ChatClient, ChatOptions, ChatRequest, Content, EventStream, Message, Tool, ToolCall, ToolChoice};
use crmpilot_types::TurnState;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Calls the model once and appends its reply to the state
pub struct LLMNode {
    client: Arc<dyn ChatClient>,
    tools: Vec<Tool>,
    breaker: Arc<CircuitBreaker>,
}

#[derive(Default)]
struct ToolCallBuffer {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl LLMNode {
    pub fn new(client: Arc<dyn ChatClient>, tools: Vec<Tool>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { client, tools, breaker }
    }

    fn build_request(&self, state: &TurnState) -> ChatRequest {
        let mut options = ChatOptions::new().tools(self.tools.clone());
        if !self.tools.is_empty() {
            options = options.tool_choice(ToolChoice::auto());
        }
        if let Some(temp) = state.llm_config.temperature {
            options = options.temperature(temp);
        }
        if let Some(max_tokens) = state.llm_config.max_tokens {
            options = options.max_tokens(max_tokens);
        }

        ChatRequest::new(state.llm_config.model.clone(), state.messages.clone()).with_options(options)
    }

    /// Forward deltas to the client and assemble the assistant message
    async fn process_stream(&self, mut stream: EventStream, event_tx: &EventSender) -> Result<Message> {
        let mut content = String::new();
        let mut buffers: BTreeMap<u32, ToolCallBuffer> = BTreeMap::new();

        while let Some(event) = stream.next().await {
            let event = event?;
            emit(event_tx, event.clone().into()).await;

            match event {
                crmpilot_llm::StreamEvent::Message { content: delta } => content.push_str(&delta),
                crmpilot_llm::StreamEvent::ToolCall { index, id, name, arguments } => {
                    let buffer = buffers.entry(index).or_default();
                    if let Some(id) = id {
                        buffer.id = Some(id);
                    }
                    if let Some(name) = name {
                        buffer.name = Some(name);
                    }
                    if let Some(args) = arguments {
                        buffer.arguments.push_str(&args);
                    }
                }
                crmpilot_llm::StreamEvent::Done { .. } => {}
            }
        }

        let tool_calls: Vec<ToolCall> = buffers
            .into_iter()
            .filter_map(|(index, buffer)| {
                let Some(name) = buffer.name else {
                    tracing::warn!(index, "dropping tool call without a name");
                    return None;
                };
                let id = buffer.id.unwrap_or_else(|| format!("call_{index}"));
                Some(ToolCall::new(id, name, buffer.arguments))
            })
            .collect();

        let content = (!content.is_empty()).then(|| Content::text(content));
        Ok(if tool_calls.is_empty() {
            Message::AI { content, tool_calls: None }
        } else {
            Message::ai_with_tools(content, tool_calls)
        })
    }
}

#[async_trait]
impl Node for LLMNode {
    async fn execute(&self, state: &mut TurnState, event_tx: EventSender) -> Result<()> {
        let model = state.llm_config.model.clone();
        if !self.breaker.is_available(&model) {
            bail!("Model {model} is temporarily unavailable after repeated upstream failures");
        }

        tracing::debug!(model = %model, messages = state.messages.len(), tools = self.tools.len(), "calling model");

        let request = self.build_request(state);
        let result = match self.client.chat_stream(request).await {
            Ok(stream) => self.process_stream(stream, &event_tx).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(message) => {
                self.breaker.record_success(&model);
                if !matches!(&message, Message::AI { content: None, tool_calls: None }) {
                    state.add_message(message);
                }
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure(&model);
                Err(e)
            }
        }
    }

    fn node_type(&self) -> NodeType {
        NodeType::LLM
    }
}
