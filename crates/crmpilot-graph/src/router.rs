use crate::node::NodeType;
use crmpilot_types::TurnState;

/// Decides which node runs next based on the current state
pub trait Router: Send + Sync {
    fn next(&self, state: &TurnState, current: NodeType) -> NextNode;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextNode {
    LLM,
    Tool,
    End,
}

/// ReAct routing: LLM -> Tool (while tool calls are pending) -> LLM -> End
pub struct SimpleRouter;

impl Router for SimpleRouter {
    fn next(&self, state: &TurnState, current: NodeType) -> NextNode {
        match current {
            NodeType::LLM => {
                if state.has_pending_tool_calls() {
                    NextNode::Tool
                } else {
                    NextNode::End
                }
            }
            NodeType::Tool => NextNode::LLM,
        }
    }
}
