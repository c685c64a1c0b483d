//! Tool catalog and invocation types.

use serde::{Deserialize, Serialize};

/// A tool as listed by an MCP server, before it is tagged with its provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpToolSchema {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// A tool in the merged catalog. Unique by (`provider`, `name`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the arguments, passed through untouched.
    pub input_schema: serde_json::Value,
}

impl ToolDescriptor {
    pub fn from_schema(provider: impl Into<String>, schema: McpToolSchema) -> Self {
        Self {
            provider: provider.into(),
            name: schema.name,
            description: schema.description.unwrap_or_default(),
            input_schema: schema.input_schema,
        }
    }

    /// `<provider>__<tool>`, the name the model sees.
    pub fn qualified_name(&self) -> String {
        super::translate::qualified_name(&self.provider, &self.name)
    }
}

/// Raw payload of a successful `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct McpToolCallResult {
    pub structured_content: Option<serde_json::Value>,
    pub text_content: Option<String>,
    pub content: Vec<serde_json::Value>,
}

impl McpToolCallResult {
    pub fn into_value_or_text(self) -> serde_json::Value {
        if let Some(structured) = self.structured_content {
            return structured;
        }
        if let Some(text) = self.text_content {
            return serde_json::Value::String(text);
        }
        serde_json::Value::Array(self.content)
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocationRequest {
    pub id: String,
    /// Qualified name as the model issued it.
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Outcome of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(serde_json::Value),
    Failure { reason: String },
}

impl ToolOutcome {
    pub fn success(value: serde_json::Value) -> Self {
        Self::Success(value)
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Result for exactly one [`ToolInvocationRequest`], matched by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocationResult {
    pub id: String,
    /// Owning provider, if the name resolved to one.
    pub provider: Option<String>,
    /// Upstream tool name, or the requested name when unresolved.
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolInvocationResult {
    /// Text handed back to the model for this result.
    pub fn render(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success(value) => match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            ToolOutcome::Failure { reason } => format!("Error: {reason}"),
        }
    }
}

/// Display metadata for a requested call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallInfo {
    pub provider: Option<String>,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}
