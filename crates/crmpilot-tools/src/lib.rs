pub mod credentials;
pub mod error;
pub mod providers;
pub mod registry;
pub mod tool;
pub mod visualize;
pub mod web_search;
pub mod workflow;

pub use credentials::{CredentialResolver, OAuthClient, REFRESH_MARGIN_SECS};
pub use error::{Result, ToolError};
pub use registry::{AgentProfile, ToolRegistry, ToolSet, ToolsConfig};
pub use tool::{CrmTool, ToolOutput};
