pub mod types;
pub mod traits;
pub mod streaming;
pub mod buffer_utils;
pub mod openai;

pub use traits::{ChatClient, ChatRequest, ChatResponse, ChatOptions, TokenUsage, EventStream};

pub use streaming::StreamEvent;
pub use buffer_utils::CircularLineBuffer;
pub use openai::OpenAIClient;
pub use types::{Message, Content, Tool, ToolCall, ToolChoice, FunctionCall};
