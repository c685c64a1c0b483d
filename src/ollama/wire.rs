//! Request bodies and streamed response messages of the Ollama API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    ChatMessage, CompletionRecord, InferenceInput, InferenceRequest, KeepAlive, ModelOptions,
    ModelToolCall, OllamaTool, Role,
};

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a [i64]>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    images: &'a [String],
    stream: bool,
    #[serde(skip_serializing_if = "ModelOptions::is_empty")]
    options: &'a ModelOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a KeepAlive>,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [OllamaTool]>,
    stream: bool,
    #[serde(skip_serializing_if = "ModelOptions::is_empty")]
    options: &'a ModelOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a KeepAlive>,
}

/// Serialize a request for its endpoint.
///
/// Chat requests never carry `context`. Request-level images go onto the last
/// user message (or a new empty user message when there is none).
pub fn request_body(request: &InferenceRequest, stream: bool) -> serde_json::Result<serde_json::Value> {
    match &request.input {
        InferenceInput::Prompt { prompt, system } => serde_json::to_value(GenerateBody {
            model: &request.model,
            prompt,
            system: system.as_deref(),
            context: request.context.as_deref(),
            images: &request.images,
            stream,
            options: &request.options,
            keep_alive: request.keep_alive.as_ref(),
        }),
        InferenceInput::Messages(messages) => {
            let mut messages = messages.clone();
            if !request.images.is_empty() {
                attach_images(&mut messages, &request.images);
            }
            serde_json::to_value(ChatBody {
                model: &request.model,
                messages,
                tools: request.tools.as_deref().filter(|t| !t.is_empty()),
                stream,
                options: &request.options,
                keep_alive: request.keep_alive.as_ref(),
            })
        }
    }
}

fn attach_images(messages: &mut Vec<ChatMessage>, images: &[String]) {
    match messages.iter_mut().rev().find(|m| m.role == Role::User) {
        Some(last_user) => last_user
            .images
            .get_or_insert_with(Vec::new)
            .extend(images.iter().cloned()),
        None => messages.push(ChatMessage::user("").with_images(images.iter().cloned())),
    }
}

/// Message content as it appears in chat stream lines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<Vec<ModelToolCall>>,
}

/// One line of a generate or chat response.
///
/// Every field is optional: lines differ between endpoints and server versions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Generate endpoint text.
    #[serde(default)]
    pub response: Option<String>,
    /// Chat endpoint message.
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub load_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
    #[serde(default)]
    pub context: Option<Vec<i64>>,
    /// Mid-stream server failure.
    #[serde(default)]
    pub error: Option<String>,
}

impl StreamMessage {
    /// Generated text carried by this line, whichever endpoint produced it.
    pub fn content(&self) -> &str {
        if let Some(response) = &self.response {
            return response;
        }
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }

    pub fn take_tool_calls(&mut self) -> Vec<ModelToolCall> {
        self.message
            .as_mut()
            .and_then(|m| m.tool_calls.take())
            .unwrap_or_default()
    }

    /// Completion metadata, missing fields defaulting to zero.
    pub fn into_record(self, tool_calls: Vec<ModelToolCall>) -> CompletionRecord {
        CompletionRecord {
            model: self.model,
            created_at: self.created_at,
            done_reason: self.done_reason,
            total_duration: self.total_duration.unwrap_or_default(),
            load_duration: self.load_duration.unwrap_or_default(),
            prompt_eval_count: self.prompt_eval_count.unwrap_or_default(),
            prompt_eval_duration: self.prompt_eval_duration.unwrap_or_default(),
            eval_count: self.eval_count.unwrap_or_default(),
            eval_duration: self.eval_duration.unwrap_or_default(),
            context: self.context,
            tool_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn generate_body_omits_empty_fields() {
        let request = InferenceRequest::generate("llama3", "hi");
        assert_eq!(
            request_body(&request, true).unwrap(),
            json!({"model": "llama3", "prompt": "hi", "stream": true})
        );
    }

    #[test]
    fn generate_body_carries_context_and_keep_alive() {
        let mut request = InferenceRequest::generate("llama3", "more");
        request.context = Some(vec![1, 2, 3]);
        request.keep_alive = Some(KeepAlive::unload());
        request.options.temperature = Some(0.2);
        assert_eq!(
            request_body(&request, false).unwrap(),
            json!({
                "model": "llama3",
                "prompt": "more",
                "context": [1, 2, 3],
                "stream": false,
                "options": {"temperature": 0.2},
                "keep_alive": 0
            })
        );
    }

    #[test]
    fn chat_body_ignores_context_and_attaches_images_to_last_user_message() {
        let mut request = InferenceRequest::chat(
            "llava",
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("ok"),
                ChatMessage::user("what is this?"),
            ],
        );
        request.context = Some(vec![9]);
        request.images = vec!["aGk=".into()];

        let body = request_body(&request, true).unwrap();
        assert!(body.get("context").is_none());
        assert_eq!(body["messages"][2]["images"], json!(["aGk="]));
        assert!(body["messages"][0].get("images").is_none());
    }

    #[test]
    fn done_line_with_missing_fields_defaults_to_zero() {
        let message: StreamMessage = serde_json::from_str(r#"{"done":true}"#).unwrap();
        let record = message.into_record(Vec::new());
        assert_eq!(record, CompletionRecord::default());
    }

    #[test]
    fn chat_line_exposes_content_and_tool_calls() {
        let mut message: StreamMessage = serde_json::from_str(
            r#"{"model":"llama3","message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"calc__add","arguments":{"a":1}}}]},"done":false}"#,
        )
        .unwrap();
        assert_eq!(message.content(), "");
        let calls = message.take_tool_calls();
        assert_eq!(calls[0].function.name, "calc__add");
    }
}
