mod anthropic;
mod base_url;
mod error;

pub use anthropic::{AnthropicModel, ANTHROPIC_VERSION};
pub use base_url::{resolve_endpoint, DEFAULT_BASE_URL};
pub use error::AdapterError;

pub use galley_core::model::{ChatModel, ModelCallError, ModelReply, ModelRequest, TokenUsage};
