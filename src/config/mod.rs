//! Configuration (layered: code > env > config file > defaults).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ParleyError, Result};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

const DEFAULT_SERVER: &str = "local";

/// One named Ollama server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub url: String,
    /// Passed straight to the HTTP client. Disable only for self-signed servers.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

impl ServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            verify_tls: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL)
    }
}

/// Top-level settings.
///
/// ```
/// let config = parley::config::ParleyConfig::from_toml_str(r#"
/// default_server = "gpu"
///
/// [servers.gpu]
/// url = "https://gpu.lan:11434"
/// verify_tls = false
/// "#).unwrap();
/// assert_eq!(config.server().unwrap().url, "https://gpu.lan:11434");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParleyConfig {
    pub servers: BTreeMap<String, ServerConfig>,
    pub default_server: String,
    /// HTTP connect timeout for the inference server.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for non-streaming calls (model listing, unload).
    pub request_timeout_secs: u64,
    /// Upper bound on establishing a tool provider session.
    pub tool_connect_timeout_secs: u64,
    /// Number of previous exchanges sent with each chat turn.
    pub history_window: usize,
    /// Path of the `mcpServers` JSON file.
    pub mcp_config: Option<PathBuf>,
    /// Directory for saved conversations.
    pub history_dir: Option<PathBuf>,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        let mut servers = BTreeMap::new();
        servers.insert(DEFAULT_SERVER.to_string(), ServerConfig::default());
        Self {
            servers,
            default_server: DEFAULT_SERVER.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            tool_connect_timeout_secs: 30,
            history_window: 10,
            mcp_config: None,
            history_dir: None,
        }
    }
}

impl ParleyConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ParleyError::Configuration(e.to_string()))
    }

    /// Load a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Apply environment overrides on top of `self`.
    ///
    /// Reads `.env` if present. `OLLAMA_HOST` / `OLLAMA_BASE_URL` replace the
    /// default server URL.
    pub fn with_env(mut self) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => warn!(error = %e, "skipping unreadable .env"),
        }

        let url = std::env::var("OLLAMA_BASE_URL")
            .or_else(|_| std::env::var("OLLAMA_HOST"))
            .ok();
        if let Some(url) = url {
            let url = normalize_host(&url);
            self.servers
                .entry(self.default_server.clone())
                .and_modify(|server| server.url = url.clone())
                .or_insert_with(|| ServerConfig::new(url));
        }

        if let Ok(raw) = std::env::var("PARLEY_VERIFY_TLS") {
            let verify = parse_bool(&raw).ok_or_else(|| {
                ParleyError::Configuration(format!("PARLEY_VERIFY_TLS: not a boolean: {raw}"))
            })?;
            if let Some(server) = self.servers.get_mut(&self.default_server) {
                server.verify_tls = verify;
            }
        }

        if let Ok(path) = std::env::var("PARLEY_MCP_CONFIG") {
            self.mcp_config = Some(PathBuf::from(path));
        }

        if let Ok(raw) = std::env::var("PARLEY_HISTORY_WINDOW") {
            self.history_window = raw.trim().parse().map_err(|_| {
                ParleyError::Configuration(format!("PARLEY_HISTORY_WINDOW: not a number: {raw}"))
            })?;
        }

        Ok(self)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// `~/.parley`, where the config file, tool servers and chats live by default.
    pub fn default_dir() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".parley"))
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }

    /// The default server entry.
    pub fn server(&self) -> Result<&ServerConfig> {
        self.server_named(&self.default_server)
    }

    pub fn server_named(&self, name: &str) -> Result<&ServerConfig> {
        self.servers
            .get(name)
            .ok_or_else(|| ParleyError::Configuration(format!("unknown server '{name}'")))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tool_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_connect_timeout_secs)
    }

    pub fn mcp_config_path(&self) -> PathBuf {
        self.mcp_config
            .clone()
            .unwrap_or_else(|| Self::default_dir().join("mcp_servers.json"))
    }

    pub fn history_path(&self) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| Self::default_dir().join("chats"))
    }
}

fn default_true() -> bool {
    true
}

/// `OLLAMA_HOST` is often given without a scheme (`0.0.0.0:11434`).
fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
