use crate::node::{emit, EventSender, Node, NodeType};
use crate::usage::UsageRecorder;
use anyhow::Result;
use async_trait::async_trait;
use crmpilot_persist::UsageDelta;
use crmpilot_tools::ToolSet;
use crmpilot_types::{StreamEvent, TurnState};
use std::time::Instant;

/// Runs every pending tool call of the last assistant message.
///
/// Failures stay inside the tool boundary: the model sees
/// `Tool execution failed: <reason>` and decides what to do next.
pub struct ToolNode {
    tools: ToolSet,
    usage: UsageRecorder,
}

impl ToolNode {
    pub fn new(tools: ToolSet, usage: UsageRecorder) -> Self {
        Self { tools, usage }
    }
}

#[async_trait]
impl Node for ToolNode {
    async fn execute(&self, state: &mut TurnState, event_tx: EventSender) -> Result<()> {
        let tool_calls = state.pending_tool_calls();

        for tool_call in tool_calls {
            let start = Instant::now();
            let name = tool_call.name().to_string();

            let (result, is_error, delta) = match self.tools.execute(&name, &tool_call.function.arguments).await {
                Ok(output) => {
                    let delta = output.usage.clone();
                    (output.to_content_string(), false, delta)
                }
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "tool call failed");
                    (format!("Tool execution failed: {e}"), true, UsageDelta::error())
                }
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            tracing::info!(tool = %name, is_error, duration_ms, "tool call finished");
            self.usage.record(delta).await;

            emit(
                &event_tx,
                StreamEvent::ToolResult {
                    tool_call_id: tool_call.id.clone(),
                    name,
                    result: result.clone(),
                    is_error,
                    duration_ms,
                },
            )
            .await;

            state.add_tool_result(tool_call.id, result);
        }

        Ok(())
    }

    fn node_type(&self) -> NodeType {
        NodeType::Tool
    }
}
