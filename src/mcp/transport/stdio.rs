use std::collections::BTreeMap;

use async_trait::async_trait;
use rmcp::service::{ClientInitializeError, ServiceExt};
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{open_rmcp_session, McpTransport};
use crate::error::Result;
use crate::mcp::session::McpSession;

/// MCP server spawned as a child process speaking over stdin/stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    login_shell_env: bool,
}

impl StdioTransport {
    /// Create a stdio transport from command and args.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: BTreeMap::new(),
            login_shell_env: cfg!(unix),
        }
    }

    /// Extra environment variables for the child.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Whether to give the child the environment of a login shell.
    ///
    /// Hosts started from a desktop launcher otherwise miss the user's
    /// `PATH` (`npx`, `uvx`) and variables exported from shell profiles.
    /// On by default on Unix.
    pub fn with_login_shell_env(mut self, enabled: bool) -> Self {
        self.login_shell_env = enabled;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    fn build_command(&self, login_env: Option<&BTreeMap<String, String>>) -> Command {
        let mut command = Command::new(&self.command);
        command.args(&self.args);
        command.envs(merged_env(login_env, &self.env));
        command
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn open(&self, provider: &str) -> Result<Box<dyn McpSession>> {
        let login_env = if self.login_shell_env {
            login_shell_env().await
        } else {
            None
        };
        debug!(provider, command = %self.command, args = ?self.args, "spawning MCP server");

        open_rmcp_session(provider, |client_info| {
            let command = self.build_command(login_env);
            async move {
                let transport = TokioChildProcess::new(command).map_err(|error| {
                    ClientInitializeError::transport::<TokioChildProcess>(
                        error,
                        "spawn stdio transport",
                    )
                })?;
                client_info.into_dyn().serve(transport).await
            }
        })
        .await
    }

    fn describe(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

static LOGIN_ENV: OnceCell<Option<BTreeMap<String, String>>> = OnceCell::const_new();

/// Environment exported by the user's login shell, captured once per process.
async fn login_shell_env() -> Option<&'static BTreeMap<String, String>> {
    LOGIN_ENV.get_or_init(capture_login_env).await.as_ref()
}

async fn capture_login_env() -> Option<BTreeMap<String, String>> {
    if !cfg!(unix) {
        return None;
    }
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    match Command::new(&shell).args(["-l", "-c", "printenv"]).output().await {
        Ok(output) if output.status.success() => {
            let env = parse_env_output(&String::from_utf8_lossy(&output.stdout));
            debug!(shell = %shell, vars = env.len(), "captured login shell environment");
            (!env.is_empty()).then_some(env)
        }
        Ok(output) => {
            warn!(shell = %shell, status = %output.status, "login shell environment lookup failed");
            None
        }
        Err(e) => {
            warn!(shell = %shell, error = %e, "login shell environment lookup failed");
            None
        }
    }
}

/// Parse `printenv` output. A line that does not start a new `NAME=` entry
/// continues the previous value.
fn parse_env_output(raw: &str) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    let mut last: Option<String> = None;
    for line in raw.lines() {
        match line.split_once('=') {
            Some((key, value)) if is_env_name(key) => {
                env.insert(key.to_string(), value.to_string());
                last = Some(key.to_string());
            }
            _ => {
                if let Some(value) = last.as_ref().and_then(|key| env.get_mut(key)) {
                    value.push('\n');
                    value.push_str(line);
                }
            }
        }
    }
    env
}

fn is_env_name(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Login-shell variables first, then the server's own `env` on top.
fn merged_env(
    login_env: Option<&BTreeMap<String, String>>,
    explicit: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = login_env.cloned().unwrap_or_default();
    env.extend(explicit.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}
