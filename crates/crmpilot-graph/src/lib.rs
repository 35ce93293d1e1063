pub mod builder;
pub mod circuit_breaker;
pub mod fsm;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod router;
pub mod usage;

pub use builder::GraphBuilder;
pub use circuit_breaker::CircuitBreaker;
pub use fsm::TurnPhase;
pub use graph::Graph;
pub use node::{EventSender, Node, NodeType};
pub use router::{NextNode, Router, SimpleRouter};
pub use usage::UsageRecorder;

pub use crmpilot_types::{LLMConfig, RunStatus, StreamEvent, TurnConfig, TurnInput, TurnState};
