//! # crmpilot
//!
//! Conversational agents over a user's CRM. A turn takes the user's message,
//! picks the agent's system prompt, binds the tools the user has credentials
//! for, and streams the model's reply while tool calls run. The thread and
//! the usage ledger are updated as the turn goes.
//!
//! ## Crates
//!
//! - **crmpilot-llm**: chat model client (OpenAI-compatible, streaming)
//! - **crmpilot-types**: turn input/state, configs, stream events
//! - **crmpilot-persist**: thread, usage, credential and prompt stores
//! - **crmpilot-tools**: CRM tools, registry and credential resolver
//! - **crmpilot-graph**: turn executor
//!
//! ## Example
//!
//! ```rust,no_run
//! use crmpilot::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pilot = CrmPilot::builder()
//!         .chat_client(Arc::new(OpenAIClient::new(std::env::var("OPENAI_API_KEY")?)?))
//!         .stores(Stores::in_memory())
//!         .build()?;
//!
//!     let mut turn = pilot
//!         .start_turn(TurnRequest::new("user-1", "data-steward", "Which accounts have no owner?"))
//!         .await?;
//!
//!     while let Some(event) = turn.events.recv().await {
//!         if let StreamEvent::Message { content } = event {
//!             print!("{content}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub use crmpilot_graph as graph;
pub use crmpilot_llm as llm;
pub use crmpilot_persist as persist;
pub use crmpilot_tools as tools;
pub use crmpilot_types as types;

pub use crmpilot_graph::{CircuitBreaker, Graph};
pub use crmpilot_llm::{ChatClient, Message, OpenAIClient};
pub use crmpilot_persist::{Stores, StoresBuilder};
pub use crmpilot_tools::{ToolRegistry, ToolsConfig};
pub use crmpilot_types::{LLMConfig, RunStatus, StreamEvent, TurnConfig};

pub mod builder;
pub mod error;
pub mod service;

pub use builder::CrmPilotBuilder;
pub use error::TurnError;
pub use service::{CrmPilot, StartedTurn, TurnRequest};

pub mod prelude {
    pub use crate::builder::CrmPilotBuilder;
    pub use crate::error::TurnError;
    pub use crate::llm::{Message, OpenAIClient};
    pub use crate::persist::Stores;
    pub use crate::service::{CrmPilot, StartedTurn, TurnRequest};
    pub use crate::types::{LLMConfig, RunStatus, StreamEvent, TurnConfig};
    pub use anyhow::Result;
}
