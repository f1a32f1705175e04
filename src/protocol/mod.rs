//! Wire types: tool discovery and OpenAI-style chat completions

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// Model name reported in chat completion responses
pub const MODEL_NAME: &str = "wazuh-mcp-server";

/// Reserved system message content that requests discovery
pub const LIST_TOOLS: &str = "list_tools";
