//! HTTP transport to the inference server and server error classification.

use std::sync::OnceLock;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{ParleyError, Result, TransportFailure};

/// Raw response body chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// A reqwest client bound to one server base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        server: &ServerConfig,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        // No overall timeout on the client: streamed generations can run for minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(10)
            .danger_accept_invalid_certs(!server.verify_tls)
            .build()
            .map_err(|e| ParleyError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: server.url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and hand back the response body as raw chunks.
    ///
    /// A non-2xx status is classified from the body before any chunk is read.
    pub async fn post_stream(
        &self,
        path: &str,
        body: &serde_json::Value,
        model: &str,
    ) -> Result<ByteStream> {
        let url = self.url(path);
        debug!(url = %url, model, "ollama POST (streamed)");

        let resp = self.client.post(&url).json(body).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body_text = match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    debug!(error = %e, status, "could not read error body");
                    format!("HTTP {status} (body unreadable: {e})")
                }
            };
            return Err(classify_server_error(model, Some(status), &body_text));
        }

        let stream = resp.bytes_stream().map(|chunk| match chunk {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(e) => Err(ParleyError::Transport {
                failure: TransportFailure::Interrupted,
                message: e.to_string(),
                source: Some(Box::new(e)),
            }),
        });
        Ok(Box::pin(stream))
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "ollama GET");
        let resp = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        self.read_json(resp, "").await
    }

    /// POST a JSON body and decode a single JSON response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
        model: &str,
    ) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, model, "ollama POST");
        let resp = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.request_timeout)
            .send()
            .await?;
        self.read_json(resp, model).await
    }

    async fn read_json<T: DeserializeOwned>(&self, resp: reqwest::Response, model: &str) -> Result<T> {
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(classify_server_error(model, Some(status), &text));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Extract the message of an `{"error": "..."}` body, or the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Map a server error to the error the user should see.
///
/// `status` is `None` for an error line received mid-stream.
pub fn classify_server_error(model: &str, status: Option<u16>, body: &str) -> ParleyError {
    let message = error_message(body);

    if let Some(caps) = model_not_found_re().captures(&message) {
        let missing = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| model.to_string());
        return ParleyError::ModelNotInstalled {
            suggestion: format!("ollama pull {missing}"),
            model: missing,
        };
    }

    let lower = message.to_ascii_lowercase();
    let broken_file = ["no such file", "does not exist", "invalid file magic", "unsupported model format"]
        .iter()
        .any(|needle| lower.contains(needle));
    if broken_file {
        if let Some(file) = file_path_re().find(&message) {
            return ParleyError::CustomModel {
                model: model.to_string(),
                file: file.as_str().to_string(),
            };
        }
    }

    let failure = match status {
        Some(code) => TransportFailure::Status(code),
        None => TransportFailure::Other,
    };
    ParleyError::transport(failure, message)
}

fn model_not_found_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"model ['"]?([^'"\s]*)['"]? not found"#).expect("valid model regex")
    })
}

fn file_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?:[A-Za-z]:\\|~?/)[^\s:'"]+"#).expect("valid path regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_found_yields_pull_suggestion() {
        let err = classify_server_error(
            "llama3",
            Some(404),
            r#"{"error":"model \"llama3\" not found, try pulling it first"}"#,
        );
        match err {
            ParleyError::ModelNotInstalled { model, suggestion } => {
                assert_eq!(model, "llama3");
                assert_eq!(suggestion, "ollama pull llama3");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_model_file_is_custom_model_error() {
        let err = classify_server_error(
            "mario",
            Some(500),
            r#"{"error":"open /home/me/models/base.gguf: no such file or directory"}"#,
        );
        match err {
            ParleyError::CustomModel { model, file } => {
                assert_eq!(model, "mario");
                assert_eq!(file, "/home/me/models/base.gguf");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_error_keeps_status() {
        let err = classify_server_error("llama3", Some(503), "overloaded");
        match err {
            ParleyError::Transport { failure, message, .. } => {
                assert_eq!(failure, TransportFailure::Status(503));
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mid_stream_error_without_status_is_other_transport() {
        let err = classify_server_error("llama3", None, r#"{"error":"out of memory"}"#);
        assert!(matches!(
            err,
            ParleyError::Transport {
                failure: TransportFailure::Other,
                ..
            }
        ));
    }
}
