//! Connection to one tool provider.

use std::time::Duration;

use tracing::{debug, warn};

use super::schema::{McpToolCallResult, ToolDescriptor};
use super::session::McpSession;
use super::transport::McpTransport;
use crate::error::{ParleyError, Result};
use crate::util::timeout::with_timeout;

/// Default bound on spawning and initializing a provider.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A configured MCP server.
///
/// Every operation opens its own session and closes it before returning, so
/// a live session never outlives the call that needed it. The tool catalog
/// is cached between listings.
pub struct ProviderConnection {
    name: String,
    transport: Box<dyn McpTransport>,
    connect_timeout: Duration,
    state: ConnectionState,
    cache: Option<Vec<ToolDescriptor>>,
}

impl ProviderConnection {
    /// Surrounding whitespace is stripped from `name`.
    pub fn new(name: impl Into<String>, transport: Box<dyn McpTransport>) -> Self {
        let name: String = name.into();
        Self {
            name: name.trim().to_string(),
            transport,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            state: ConnectionState::Disconnected,
            cache: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    pub fn cached_tools(&self) -> Option<&[ToolDescriptor]> {
        self.cache.as_deref()
    }

    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// List the provider's tools, from cache when allowed and present.
    ///
    /// A fresh listing always overwrites the cache.
    pub async fn list_tools(&mut self, use_cache: bool) -> Result<Vec<ToolDescriptor>> {
        if use_cache {
            if let Some(cached) = &self.cache {
                debug!(provider = %self.name, tools = cached.len(), "using cached tool catalog");
                return Ok(cached.clone());
            }
        }

        let mut session = self.connect().await?;
        let listed = session.list_tools().await;
        self.disconnect(session.as_mut()).await;

        let mut tools: Vec<ToolDescriptor> = Vec::new();
        for schema in listed? {
            if tools.iter().any(|t| t.name == schema.name) {
                warn!(provider = %self.name, tool = %schema.name, "duplicate tool name ignored");
                continue;
            }
            tools.push(ToolDescriptor::from_schema(&self.name, schema));
        }
        debug!(provider = %self.name, tools = tools.len(), "listed tools");
        self.cache = Some(tools.clone());
        Ok(tools)
    }

    /// Call one tool. Never served from cache.
    pub async fn invoke_tool(
        &mut self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut session = self.connect().await?;
        let result = session.call_tool(tool, arguments).await;
        self.disconnect(session.as_mut()).await;
        result.map(McpToolCallResult::into_value_or_text)
    }

    /// Call several tools in order over a single session.
    ///
    /// The outer error means no session could be established. Each call
    /// otherwise has its own result, and one failing call does not stop the
    /// ones after it.
    pub async fn invoke_tools(
        &mut self,
        calls: &[(String, serde_json::Value)],
    ) -> Result<Vec<Result<serde_json::Value>>> {
        let mut session = self.connect().await?;
        let mut results = Vec::with_capacity(calls.len());
        for (tool, arguments) in calls {
            debug!(provider = %self.name, tool = %tool, "calling tool");
            let result = session
                .call_tool(tool, arguments.clone())
                .await
                .map(McpToolCallResult::into_value_or_text);
            if let Err(e) = &result {
                warn!(provider = %self.name, tool = %tool, error = %e, "tool call failed");
            }
            results.push(result);
        }
        self.disconnect(session.as_mut()).await;
        Ok(results)
    }

    async fn connect(&mut self) -> Result<Box<dyn McpSession>> {
        self.state = ConnectionState::Connecting;
        let opened = with_timeout(self.connect_timeout, self.transport.open(&self.name)).await;
        match opened {
            Ok(session) => {
                self.state = ConnectionState::Connected;
                Ok(session)
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(match e {
                    ParleyError::Timeout(ms) => ParleyError::provider_unavailable(
                        &self.name,
                        format!("connect timed out after {ms}ms"),
                    ),
                    other => other,
                })
            }
        }
    }

    async fn disconnect(&mut self, session: &mut dyn McpSession) {
        if let Err(e) = session.close().await {
            warn!(provider = %self.name, error = %e, "closing MCP session failed");
        }
        self.state = ConnectionState::Disconnected;
    }
}

impl std::fmt::Debug for ProviderConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConnection")
            .field("name", &self.name)
            .field("transport", &self.transport.describe())
            .field("state", &self.state)
            .field("cached_tools", &self.cache.as_ref().map(Vec::len))
            .finish()
    }
}
