//! Inference requests and sampling settings.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::ChatMessage;
use super::tool::OllamaTool;

/// A request for one inference attempt.
///
/// A `Prompt` input targets the generate endpoint, a `Messages` input the
/// chat endpoint. The client only borrows a request, so it is never
/// modified after submission.
///
/// ```
/// use parley::types::{ChatMessage, InferenceInput, InferenceRequest, KeepAlive};
///
/// let request = InferenceRequest::builder()
///     .model("llama3")
///     .input(InferenceInput::Messages(vec![ChatMessage::user("2+2?")]))
///     .keep_alive(KeepAlive::duration("5m"))
///     .build();
/// assert_eq!(request.model, "llama3");
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct InferenceRequest {
    #[builder(into)]
    pub model: String,
    pub input: InferenceInput,
    /// Continuation context from a previous generate completion.
    pub context: Option<Vec<i64>>,
    /// Base64 images. On chat requests they are attached to the last user message.
    #[builder(default)]
    #[serde(default)]
    pub images: Vec<String>,
    #[builder(default)]
    #[serde(default)]
    pub options: ModelOptions,
    pub keep_alive: Option<KeepAlive>,
    pub tools: Option<Vec<OllamaTool>>,
}

impl InferenceRequest {
    /// Single-prompt request for the generate endpoint.
    pub fn generate(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::builder()
            .model(model)
            .input(InferenceInput::Prompt {
                prompt: prompt.into(),
                system: None,
            })
            .build()
    }

    /// Message-list request for the chat endpoint.
    pub fn chat(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self::builder()
            .model(model)
            .input(InferenceInput::Messages(messages))
            .build()
    }

    pub fn endpoint(&self) -> Endpoint {
        match self.input {
            InferenceInput::Prompt { .. } => Endpoint::Generate,
            InferenceInput::Messages(_) => Endpoint::Chat,
        }
    }
}

/// Prompt or ordered message list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum InferenceInput {
    Prompt {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system: Option<String>,
    },
    Messages(Vec<ChatMessage>),
}

/// Inference endpoint selected by the request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Endpoint {
    Generate,
    Chat,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Generate => "/api/generate",
            Self::Chat => "/api/chat",
        }
    }
}

/// Sampling options forwarded verbatim in the `options` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl ModelOptions {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn with_creativity(mut self, creativity: Creativity) -> Self {
        self.temperature = Some(creativity.temperature());
        self
    }
}

/// How long the server keeps the model loaded after the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeepAlive {
    /// Duration string such as `"5m"` or `"-1"`.
    Duration(String),
    Seconds(i64),
}

impl KeepAlive {
    pub fn duration(value: impl Into<String>) -> Self {
        Self::Duration(value.into())
    }

    /// Unload the model as soon as the request completes.
    pub fn unload() -> Self {
        Self::Seconds(0)
    }
}

/// Temperature presets offered to users.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Creativity {
    None,
    Low,
    #[default]
    Medium,
    High,
    Maximum,
}

impl Creativity {
    pub fn temperature(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Low => 0.4,
            Self::Medium => 0.7,
            Self::High => 1.0,
            Self::Maximum => 1.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_follows_input_kind() {
        assert_eq!(
            InferenceRequest::generate("llama3", "hi").endpoint(),
            Endpoint::Generate
        );
        assert_eq!(
            InferenceRequest::chat("llama3", vec![ChatMessage::user("hi")]).endpoint(),
            Endpoint::Chat
        );
        assert_eq!(Endpoint::Chat.path(), "/api/chat");
    }

    #[test]
    fn keep_alive_serializes_untagged() {
        assert_eq!(serde_json::to_value(KeepAlive::unload()).unwrap(), 0);
        assert_eq!(serde_json::to_value(KeepAlive::duration("5m")).unwrap(), "5m");
    }

    #[test]
    fn creativity_parses_and_maps_to_temperature() {
        let creativity: Creativity = "high".parse().unwrap();
        let options = ModelOptions::default().with_creativity(creativity);
        assert_eq!(options.temperature, Some(1.0));
        assert!(!options.is_empty());
        assert!(ModelOptions::default().is_empty());
    }
}
