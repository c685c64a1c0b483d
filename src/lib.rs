//! Parley: a streaming Ollama client with multi-server MCP tools.
//!
//! [`ollama::OllamaClient`] turns inference requests into cancellable streams
//! of [`types::InferenceEvent`]s. [`mcp::ToolOrchestrator`] merges the tool
//! catalogs of several MCP servers and dispatches model tool calls to them.
//! [`session::ChatSession`] ties both together in a two-phase chat turn.
//!
//! # Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use parley::prelude::*;
//!
//! # async fn example() -> parley::error::Result<()> {
//! let client = OllamaClient::new("http://127.0.0.1:11434")?;
//! let request = InferenceRequest::generate("llama3", "Why is the sky blue?");
//! let mut stream = client.run_inference(&request).await?;
//! while let Some(event) = stream.next().await {
//!     match event? {
//!         InferenceEvent::Delta(text) => print!("{text}"),
//!         InferenceEvent::Done(record) => println!("\n{} tokens", record.eval_count),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod mcp;
pub mod notify;
pub mod ollama;
pub mod prelude;
pub mod session;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
