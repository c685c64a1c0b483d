//! Installed and loaded model management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::client::OllamaClient;
use crate::error::Result;
use crate::types::KeepAlive;

/// Model family and quantization details.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelDetails {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub families: Option<Vec<String>>,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
}

/// An entry of `/api/tags`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstalledModel {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: ModelDetails,
}

/// An entry of `/api/ps`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadedModel {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub size_vram: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: ModelDetails,
}

#[derive(Deserialize)]
struct ModelList<T> {
    #[serde(default = "Vec::new")]
    models: Vec<T>,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: String,
}

impl OllamaClient {
    /// Models installed on the server.
    pub async fn installed_models(&self) -> Result<Vec<InstalledModel>> {
        let list: ModelList<InstalledModel> = self.http.get_json("/api/tags").await?;
        Ok(list.models)
    }

    /// Models currently loaded in memory.
    pub async fn loaded_models(&self) -> Result<Vec<LoadedModel>> {
        let list: ModelList<LoadedModel> = self.http.get_json("/api/ps").await?;
        Ok(list.models)
    }

    /// Ask the server to unload `model` right away.
    pub async fn unload_model(&self, model: &str) -> Result<()> {
        let body = json!({
            "model": model,
            "keep_alive": KeepAlive::unload(),
            "stream": false,
        });
        let _: serde_json::Value = self.http.post_json("/api/generate", &body, model).await?;
        info!(model, "model unloaded");
        Ok(())
    }

    pub async fn version(&self) -> Result<String> {
        let v: VersionResponse = self.http.get_json("/api/version").await?;
        Ok(v.version)
    }
}
