//! Mapping of decoded response lines to inference events.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::classify_server_error;
use super::wire::StreamMessage;
use crate::error::{ParleyError, Result};
use crate::types::{InferenceEvent, InferenceOutput, ModelToolCall};

/// Turns response lines into `Delta`s and one terminal `Done`.
#[derive(Debug)]
pub struct EventMapper {
    model: String,
    tool_calls: Vec<ModelToolCall>,
    received: usize,
    finished: bool,
}

impl EventMapper {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            tool_calls: Vec::new(),
            received: 0,
            finished: false,
        }
    }

    /// Map one line. An `error` line is classified like an error body.
    pub fn map(&mut self, mut message: StreamMessage) -> Result<Vec<InferenceEvent>> {
        self.received += 1;
        if let Some(error) = message.error.take() {
            return Err(classify_server_error(&self.model, None, &error));
        }

        self.tool_calls.extend(message.take_tool_calls());

        let mut events = Vec::new();
        let content = message.content();
        if !content.is_empty() {
            events.push(InferenceEvent::Delta(content.to_string()));
        }
        if message.done {
            self.finished = true;
            let tool_calls = std::mem::take(&mut self.tool_calls);
            events.push(InferenceEvent::Done(message.into_record(tool_calls)));
        }
        Ok(events)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Check the input ended with a `done` line.
    pub fn finish(&self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let reason = if self.received == 0 {
            "no messages received".to_string()
        } else {
            format!("stream ended after {} messages without done", self.received)
        };
        Err(ParleyError::IncompleteStream(reason))
    }
}

/// Build the event stream for one inference attempt.
///
/// Ends after `Done`, after the first error, or as soon as `cancel` fires.
/// Lines after `Done` are never read.
pub fn inference_events(
    messages: BoxStream<'static, Result<StreamMessage>>,
    model: String,
    cancel: CancellationToken,
) -> BoxStream<'static, Result<InferenceEvent>> {
    let stream = async_stream::stream! {
        let mut mapper = EventMapper::new(model.clone());
        let mut messages = messages;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(model = %model, "inference cancelled");
                    return;
                }
                next = messages.next() => next,
            };
            let Some(message) = next else { break };

            let events = match message.and_then(|m| mapper.map(m)) {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for event in events {
                if cancel.is_cancelled() {
                    return;
                }
                yield Ok(event);
            }
            if mapper.is_finished() {
                return;
            }
        }

        if let Err(e) = mapper.finish() {
            yield Err(e);
        }
    };
    Box::pin(stream)
}

/// Drain an event stream into the full text and its completion record.
pub async fn collect<S>(events: S) -> Result<InferenceOutput>
where
    S: Stream<Item = Result<InferenceEvent>>,
{
    futures::pin_mut!(events);
    let mut content = String::new();
    while let Some(event) = events.next().await {
        match event? {
            InferenceEvent::Delta(text) => content.push_str(&text),
            InferenceEvent::Done(done) => return Ok(InferenceOutput { content, done }),
        }
    }
    Err(ParleyError::IncompleteStream(
        "stream ended before completion".to_string(),
    ))
}
