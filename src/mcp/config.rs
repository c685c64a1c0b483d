//! Persisted MCP server configuration.
//!
//! Uses the common `mcpServers` JSON layout:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "calc": { "command": "npx", "args": ["-y", "calc-server"], "env": {} },
//!     "docs": { "url": "https://docs.example.com/mcp" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::transport::{McpTransport, StdioTransport, StreamableHttpTransport};
use crate::error::{ParleyError, Result};

/// Launch parameters of one server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum McpServerConfig {
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    Http {
        url: String,
    },
}

impl McpServerConfig {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self::Stdio {
            command: command.into(),
            args,
            env: BTreeMap::new(),
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self::Http { url: url.into() }
    }

    pub fn transport(&self) -> Box<dyn McpTransport> {
        match self {
            Self::Stdio { command, args, env } => {
                Box::new(StdioTransport::new(command.clone(), args.clone()).with_env(env.clone()))
            }
            Self::Http { url } => Box::new(StreamableHttpTransport::new(url.clone())),
        }
    }
}

/// All configured servers, keyed by unique name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServersConfig {
    #[serde(rename = "mcpServers", default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

impl McpServersConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ParleyError::Configuration(format!("invalid mcpServers config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        for name in self.servers.keys() {
            if name.trim().is_empty() {
                return Err(ParleyError::Configuration(
                    "MCP server name must not be empty".into(),
                ));
            }
            if name.trim() != name {
                return Err(ParleyError::Configuration(format!(
                    "MCP server name '{name}' has surrounding whitespace"
                )));
            }
        }
        Ok(())
    }

    /// Add every server of `other`.
    ///
    /// Fails without changing anything when a name is already configured.
    pub fn merge(&mut self, other: McpServersConfig) -> Result<()> {
        let clashes: Vec<&str> = other
            .servers
            .keys()
            .filter(|name| self.servers.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !clashes.is_empty() {
            return Err(ParleyError::Configuration(format!(
                "MCP server names already configured: {}",
                clashes.join(", ")
            )));
        }
        self.servers.extend(other.servers);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<McpServerConfig> {
        self.servers.remove(name)
    }
}

/// Where the session gets its provider configuration from.
pub trait ProviderConfigSource: Send + Sync {
    fn load(&self) -> Result<McpServersConfig>;
}

/// Configuration held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticProviderConfig(pub McpServersConfig);

impl ProviderConfigSource for StaticProviderConfig {
    fn load(&self) -> Result<McpServersConfig> {
        Ok(self.0.clone())
    }
}

/// Configuration stored in a JSON file. A missing file is an empty config.
#[derive(Debug, Clone)]
pub struct FileProviderConfigSource {
    path: PathBuf,
}

impl FileProviderConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, config: &McpServersConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, config.to_json_string()?)?;
        Ok(())
    }

    /// Merge a pasted config into the stored one and save the result.
    pub fn merge_and_save(&self, pasted: &str) -> Result<McpServersConfig> {
        let mut current = self.load()?;
        current.merge(McpServersConfig::from_json_str(pasted)?)?;
        self.save(&current)?;
        Ok(current)
    }
}

impl ProviderConfigSource for FileProviderConfigSource {
    fn load(&self) -> Result<McpServersConfig> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => McpServersConfig::from_json_str(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(McpServersConfig::default())
            }
            Err(err) => Err(err.into()),
        }
    }
}
