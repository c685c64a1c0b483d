//! Model Context Protocol (MCP) tool providers and their orchestration.

pub mod client;
pub mod config;
pub mod orchestrator;
pub mod schema;
pub mod session;
pub mod translate;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ConnectionState, ProviderConnection};
pub use config::{
    FileProviderConfigSource, McpServerConfig, McpServersConfig, ProviderConfigSource,
    StaticProviderConfig,
};
pub use orchestrator::{MergedCatalog, ProviderFailure, ToolOrchestrator};
pub use schema::{
    McpToolCallResult, McpToolSchema, ToolCallInfo, ToolDescriptor, ToolInvocationRequest,
    ToolInvocationResult, ToolOutcome,
};
pub use session::McpSession;
pub use transport::{McpTransport, StdioTransport, StreamableHttpTransport};
