use crate::node::NodeType;
use crate::router::NextNode;
use crmpilot_types::RunStatus;

/// Phase of a running turn. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingModel,
    ExecutingTool,
    Done,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Node that runs in this phase
    pub fn node(&self) -> Option<NodeType> {
        match self {
            Self::AwaitingModel => Some(NodeType::LLM),
            Self::ExecutingTool => Some(NodeType::Tool),
            Self::Done | Self::Failed => None,
        }
    }

    /// Transition after a node finished successfully
    pub fn advance(self, next: NextNode) -> Self {
        if self.is_terminal() {
            return self;
        }
        match next {
            NextNode::LLM => Self::AwaitingModel,
            NextNode::Tool => Self::ExecutingTool,
            NextNode::End => Self::Done,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            Self::Failed => RunStatus::Failed,
            _ => RunStatus::Success,
        }
    }
}
