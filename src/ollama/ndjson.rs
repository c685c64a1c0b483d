//! Newline-delimited JSON decoding.

use std::marker::PhantomData;

use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use serde::de::DeserializeOwned;

use crate::error::{ParleyError, Result};

/// Incremental decoder for a newline-delimited JSON byte stream.
///
/// The residual is kept as bytes, so a multi-byte UTF-8 sequence split across
/// chunks is reassembled before decoding.
///
/// ```
/// use parley::ollama::ndjson::NdjsonDecoder;
///
/// let mut decoder = NdjsonDecoder::<serde_json::Value>::new();
/// assert!(decoder.push(b"{\"a\":").is_empty());
/// let messages = decoder.push(b"1}\n{\"b\"");
/// assert_eq!(messages.len(), 1);
/// assert!(decoder.push(b":2}").is_empty());
/// assert!(decoder.finish().is_some());
/// ```
#[derive(Debug)]
pub struct NdjsonDecoder<T> {
    buffer: Vec<u8>,
    _message: PhantomData<fn() -> T>,
}

impl<T> Default for NdjsonDecoder<T> {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            _message: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> NdjsonDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and decode every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<T>> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(message) = decode_line(&self.buffer[start..end]) {
                messages.push(message);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        messages
    }

    /// Decode whatever is left once the input has ended.
    pub fn finish(&mut self) -> Option<Result<T>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Option<Result<T>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(serde_json::from_slice(line).map_err(|e| ParleyError::ProtocolDecode {
        line: String::from_utf8_lossy(line).into_owned(),
        message: e.to_string(),
    }))
}

/// Adapt a byte-chunk stream into a stream of decoded messages.
///
/// Lazy and single-pass. The stream ends right after the first error.
pub fn decode_ndjson<T, S>(bytes: S) -> BoxStream<'static, Result<T>>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = Result<Vec<u8>>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = NdjsonDecoder::<T>::new();
        futures::pin_mut!(bytes);

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for message in decoder.push(&chunk) {
                let failed = message.is_err();
                yield message;
                if failed {
                    return;
                }
            }
        }

        if let Some(message) = decoder.finish() {
            yield message;
        }
    };
    Box::pin(stream)
}
