//! Convenience re-exports for common use.

pub use crate::config::ParleyConfig;
pub use crate::error::{ParleyError, Result};
pub use crate::mcp::{
    McpServersConfig, ToolDescriptor, ToolInvocationRequest, ToolInvocationResult,
    ToolOrchestrator, ToolOutcome,
};
pub use crate::ollama::{InferenceStream, OllamaClient};
pub use crate::session::{ChatSession, ChatSettings};
pub use crate::types::{
    ChatMessage, CompletionRecord, Creativity, InferenceEvent, InferenceInput, InferenceOutput,
    InferenceRequest, ModelOptions, Role,
};
