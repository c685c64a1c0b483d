//! Image attachments for vision models.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{ParleyError, Result};

/// A base64-encoded PNG or JPEG image with the place it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub source: String,
    pub base64: String,
}

impl ImageAttachment {
    /// Load an image file. Only `.png`, `.jpg` and `.jpeg` are accepted.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            .unwrap_or(false);
        if !supported {
            return Err(ParleyError::InvalidArgument(format!(
                "unsupported image type: {}",
                path.display()
            )));
        }
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(path.display().to_string(), &bytes))
    }

    /// Fetch `source` over HTTP when it is an `http(s)` URL, else read it from disk.
    pub async fn load(client: &reqwest::Client, source: &str) -> Result<Self> {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::fetch(client, source).await
        } else {
            Self::from_file(source).await
        }
    }

    pub fn from_bytes(source: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            source: source.into(),
            base64: STANDARD.encode(bytes),
        }
    }

    /// Download an image. The response must declare a PNG or JPEG content type.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self> {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ParleyError::InvalidArgument(format!(
                "image download from {url} failed with status {status}"
            )));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !(content_type.starts_with("image/png") || content_type.starts_with("image/jpeg")) {
            return Err(ParleyError::InvalidArgument(format!(
                "unsupported image content type '{content_type}' at {url}"
            )));
        }
        let bytes = response.bytes().await?;
        Ok(Self::from_bytes(url, &bytes))
    }
}
