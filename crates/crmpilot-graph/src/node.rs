use anyhow::Result;
use async_trait::async_trait;
use crmpilot_types::{StreamEvent, TurnState};
use tokio::sync::mpsc;

pub type EventSender = mpsc::Sender<StreamEvent>;

/// One step of a turn: a model call or a batch of tool calls
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute the step, mutating `state` and emitting events as it goes
    async fn execute(&self, state: &mut TurnState, event_tx: EventSender) -> Result<()>;

    fn node_type(&self) -> NodeType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    LLM,
    Tool,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LLM => "llm",
            Self::Tool => "tool",
        }
    }
}

/// Send `event` to the client, ignoring a closed channel.
///
/// A disconnected client must not stop the turn: tool calls already issued
/// still complete and the thread is still saved.
pub(crate) async fn emit(event_tx: &EventSender, event: StreamEvent) {
    if event_tx.send(event).await.is_err() {
        tracing::trace!("event receiver dropped");
    }
}
