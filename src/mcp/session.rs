//! Live MCP sessions.

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParams, CallToolResult, Content, JsonObject, ResourceContents},
    service::{ClientInitializeError, DynService, RoleClient, RunningService, ServiceError},
};
use tracing::debug;

use super::schema::{McpToolCallResult, McpToolSchema};
use crate::error::{ParleyError, Result};

pub type DynClientService = Box<dyn DynService<RoleClient>>;
pub type McpRunningService = RunningService<RoleClient, DynClientService>;

/// An initialized session with one MCP server.
///
/// A session is used for a single operation and then closed. A closed
/// session is never reused.
#[async_trait]
pub trait McpSession: Send {
    async fn list_tools(&mut self) -> Result<Vec<McpToolSchema>>;

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolCallResult>;

    /// Close the session. Closing twice is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// [`McpSession`] over an rmcp running service.
pub struct RmcpSession {
    provider: String,
    service: Option<McpRunningService>,
}

impl RmcpSession {
    pub fn new(provider: impl Into<String>, service: McpRunningService) -> Self {
        Self {
            provider: provider.into(),
            service: Some(service),
        }
    }

    fn service(&self) -> Result<&McpRunningService> {
        match self.service.as_ref() {
            Some(service) if !service.is_closed() => Ok(service),
            _ => Err(ParleyError::provider_unavailable(
                &self.provider,
                "MCP session is closed",
            )),
        }
    }
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn list_tools(&mut self) -> Result<Vec<McpToolSchema>> {
        let service = self.service()?;
        let tools = match service.list_all_tools().await {
            Ok(tools) => tools,
            // Servers without pagination support answer the plain request only.
            Err(ServiceError::UnexpectedResponse) => service
                .list_tools(None)
                .await
                .map(|page| page.tools)
                .map_err(|e| request_failure(&self.provider, "tools/list", e))?,
            Err(e) => return Err(request_failure(&self.provider, "tools/list", e)),
        };
        Ok(tools.into_iter().map(McpToolSchema::from).collect())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolCallResult> {
        let service = self.service()?;
        let arguments = call_arguments(arguments)?;
        let result = service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| request_failure(&self.provider, "tools/call", e))?;
        tool_call_result(&self.provider, name, result)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(service) = self.service.take() else {
            return Ok(());
        };
        let reason = service.cancel().await.map_err(|e| {
            ParleyError::provider_unavailable(&self.provider, format!("MCP close failed: {e}"))
        })?;
        debug!(provider = %self.provider, ?reason, "MCP session closed");
        Ok(())
    }
}

impl From<rmcp::model::Tool> for McpToolSchema {
    fn from(tool: rmcp::model::Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.map(|d| d.to_string()),
            input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
        }
    }
}

/// Arguments for `tools/call`.
///
/// Saved history and some models carry them as JSON text instead of an object.
fn call_arguments(value: serde_json::Value) -> Result<Option<JsonObject>> {
    let value = match value {
        serde_json::Value::String(raw) if raw.trim().is_empty() => return Ok(None),
        serde_json::Value::String(raw) => serde_json::from_str(raw.trim()).map_err(|e| {
            ParleyError::InvalidArgument(format!("tool arguments are not valid JSON: {e}"))
        })?,
        other => other,
    };
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        other => Err(ParleyError::InvalidArgument(format!(
            "tool arguments must be a JSON object, got {other}"
        ))),
    }
}

fn text_of(item: &Content) -> Option<&str> {
    if let Some(text) = item.as_text() {
        return Some(text.text.as_str());
    }
    match &item.as_resource()?.resource {
        ResourceContents::TextResourceContents { text, .. } => Some(text.as_str()),
        _ => None,
    }
}

/// Turn a `tools/call` answer into our result, or a `ToolExecution` error
/// when the server flagged it as failed.
fn tool_call_result(provider: &str, tool: &str, result: CallToolResult) -> Result<McpToolCallResult> {
    let texts: Vec<&str> = result.content.iter().filter_map(text_of).collect();
    let text_content = (!texts.is_empty()).then(|| texts.join("\n"));

    if result.is_error == Some(true) {
        let message = match (&result.structured_content, text_content) {
            (Some(structured), _) => structured.to_string(),
            (None, Some(text)) => text,
            (None, None) => "tool reported an error without details".to_string(),
        };
        return Err(ParleyError::ToolExecution {
            provider: provider.to_string(),
            tool_name: tool.to_string(),
            message,
        });
    }

    let content = result
        .content
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect();
    Ok(McpToolCallResult {
        structured_content: result.structured_content,
        text_content,
        content,
    })
}

pub(crate) fn initialize_failure(provider: &str, error: ClientInitializeError) -> ParleyError {
    let detail = match error {
        ClientInitializeError::JsonRpcError(e) => {
            format!("server rejected initialize ({}): {}", e.code.0, e.message)
        }
        other => other.to_string(),
    };
    ParleyError::provider_unavailable(provider, format!("could not start MCP session: {detail}"))
}

fn request_failure(provider: &str, request: &str, error: ServiceError) -> ParleyError {
    match error {
        ServiceError::Timeout { timeout } => ParleyError::Timeout(timeout.as_millis() as u64),
        ServiceError::McpError(e) => ParleyError::provider_unavailable(
            provider,
            format!("{request} rejected ({}): {}", e.code.0, e.message),
        ),
        other => ParleyError::provider_unavailable(provider, format!("{request} failed: {other}")),
    }
}
