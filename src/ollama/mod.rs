//! Ollama inference server client.
//!
//! Raw response bytes go through [`ndjson`] into [`wire`] messages, which
//! [`stream`] maps onto [`InferenceEvent`](crate::types::InferenceEvent)s.

pub mod client;
pub mod http;
pub mod models;
pub mod ndjson;
pub mod stream;
pub mod wire;

pub use client::{InferenceStream, OllamaClient};
pub use models::{InstalledModel, LoadedModel, ModelDetails};
