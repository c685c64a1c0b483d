//! Function-calling shapes of the inference protocol.

use serde::{Deserialize, Serialize};

/// A tool offered to the model in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OllamaFunction,
}

impl OllamaTool {
    /// Create a function tool.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: OllamaFunction {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Function definition inside an [`OllamaTool`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaFunction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelToolCall {
    /// Only newer servers send an id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub function: ModelFunctionCall,
}

impl ModelToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: None,
            function: ModelFunctionCall {
                index: None,
                name: name.into(),
                arguments,
            },
        }
    }
}

/// Name and arguments of a requested call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}
