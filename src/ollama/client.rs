//! Streaming inference client.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::HttpTransport;
use super::ndjson::decode_ndjson;
use super::stream::{collect, inference_events};
use super::wire::{request_body, StreamMessage};
use crate::config::{ParleyConfig, ServerConfig};
use crate::error::Result;
use crate::types::{InferenceEvent, InferenceOutput, InferenceRequest};

/// Client for one Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    pub(crate) http: HttpTransport,
}

impl OllamaClient {
    /// Client for `base_url` with TLS verification on and default timeouts.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let defaults = ParleyConfig::default();
        Self::with_server(
            &ServerConfig::new(base_url),
            defaults.connect_timeout(),
            defaults.request_timeout(),
        )
    }

    pub fn with_server(
        server: &ServerConfig,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(server, connect_timeout, request_timeout)?,
        })
    }

    /// Client for the configured default server.
    pub fn from_config(config: &ParleyConfig) -> Result<Self> {
        Self::with_server(
            config.server()?,
            config.connect_timeout(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// The underlying HTTP client, for image downloads and the like.
    pub fn http_client(&self) -> &reqwest::Client {
        self.http.client()
    }

    /// Start a streamed inference.
    ///
    /// Connection and status failures surface here. Everything after the
    /// response headers arrives through the returned stream.
    pub async fn run_inference(&self, request: &InferenceRequest) -> Result<InferenceStream> {
        self.start(request, true).await
    }

    /// Run an inference with `stream: false` and return the whole answer.
    pub async fn run_inference_sync(&self, request: &InferenceRequest) -> Result<InferenceOutput> {
        self.start(request, false).await?.collect().await
    }

    async fn start(&self, request: &InferenceRequest, stream: bool) -> Result<InferenceStream> {
        let endpoint = request.endpoint();
        let body = request_body(request, stream)?;
        debug!(
            model = %request.model,
            endpoint = %endpoint,
            stream,
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "ollama inference request"
        );

        let bytes = self
            .http
            .post_stream(endpoint.path(), &body, &request.model)
            .await?;
        let messages = decode_ndjson::<StreamMessage, _>(bytes);
        let cancel = CancellationToken::new();
        let events = inference_events(messages, request.model.clone(), cancel.clone());
        Ok(InferenceStream { events, cancel })
    }
}

/// A cancellable stream of [`InferenceEvent`]s.
///
/// Dropping the stream, or cancelling through [`InferenceStream::cancel_handle`],
/// drops the HTTP response and frees the connection.
pub struct InferenceStream {
    events: BoxStream<'static, Result<InferenceEvent>>,
    cancel: CancellationToken,
}

impl InferenceStream {
    /// Token that stops the stream from another task.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain into the full text and completion record.
    pub async fn collect(self) -> Result<InferenceOutput> {
        collect(self).await
    }
}

impl Stream for InferenceStream {
    type Item = Result<InferenceEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for InferenceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
