//! Translation between MCP tool catalogs and the model's function-calling format.

use crate::error::{ParleyError, Result};
use crate::types::{ModelToolCall, OllamaTool};

use super::schema::{ToolDescriptor, ToolInvocationRequest};

/// Separator between provider and tool in qualified names.
pub const NAME_SEPARATOR: &str = "__";

pub fn qualified_name(provider: &str, tool: &str) -> String {
    format!("{provider}{NAME_SEPARATOR}{tool}")
}

/// One function tool per descriptor. Schemas are passed through unmodified.
pub fn to_ollama_tools(tools: &[ToolDescriptor]) -> Vec<OllamaTool> {
    tools
        .iter()
        .map(|tool| {
            OllamaTool::function(
                tool.qualified_name(),
                tool.description.clone(),
                tool.input_schema.clone(),
            )
        })
        .collect()
}

/// Split a qualified name into `(provider, tool)`.
///
/// Provider names may themselves contain the separator, so the longest
/// configured provider followed by `__` wins.
///
/// ```
/// use parley::mcp::translate::resolve_call;
///
/// let (provider, tool) = resolve_call("web__search__news", ["web", "web__search"]).unwrap();
/// assert_eq!((provider.as_str(), tool.as_str()), ("web__search", "news"));
/// ```
pub fn resolve_call<'a, I>(name: &str, providers: I) -> Result<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    providers
        .into_iter()
        .filter_map(|provider| {
            let tool = name.strip_prefix(provider)?.strip_prefix(NAME_SEPARATOR)?;
            (!tool.is_empty()).then_some((provider, tool))
        })
        .max_by_key(|(provider, _)| provider.len())
        .map(|(provider, tool)| (provider.to_string(), tool.to_string()))
        .ok_or_else(|| ParleyError::UnknownProvider {
            tool_name: name.to_string(),
        })
}

/// Number the model's calls. Ids sent by the server are kept.
pub fn invocation_requests(calls: &[ModelToolCall]) -> Vec<ToolInvocationRequest> {
    calls
        .iter()
        .enumerate()
        .map(|(position, call)| ToolInvocationRequest {
            id: call
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{position}")),
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
        })
        .collect()
}
