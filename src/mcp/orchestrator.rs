//! Multi-server tool orchestration.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::ProviderConnection;
use super::config::McpServersConfig;
use super::schema::{
    ToolCallInfo, ToolDescriptor, ToolInvocationRequest, ToolInvocationResult, ToolOutcome,
};
use super::translate::resolve_call;
use crate::error::{ParleyError, Result};
use crate::types::ModelToolCall;

/// A provider that could not be listed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub message: String,
}

/// Union of every reachable provider's tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MergedCatalog {
    /// Sorted by qualified name.
    pub tools: Vec<ToolDescriptor>,
    pub failures: Vec<ProviderFailure>,
}

impl MergedCatalog {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Owns the session's provider connections, keyed by unique provider name.
#[derive(Debug, Default)]
pub struct ToolOrchestrator {
    providers: BTreeMap<String, Mutex<ProviderConnection>>,
}

impl ToolOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One connection per configured server.
    pub fn from_config(config: &McpServersConfig, connect_timeout: Duration) -> Result<Self> {
        let mut orchestrator = Self::new();
        for (name, server) in &config.servers {
            let connection = ProviderConnection::new(name.clone(), server.transport())
                .with_connect_timeout(connect_timeout);
            orchestrator.add_provider(connection)?;
        }
        info!(providers = orchestrator.len(), "tool orchestrator ready");
        Ok(orchestrator)
    }

    /// Register a connection. Provider names must be non-empty and unique.
    pub fn add_provider(&mut self, connection: ProviderConnection) -> Result<()> {
        let name = connection.name().to_string();
        if name.is_empty() {
            return Err(ParleyError::Configuration(
                "tool provider name must not be empty".into(),
            ));
        }
        if self.providers.contains_key(&name) {
            return Err(ParleyError::Configuration(format!(
                "duplicate tool provider '{name}'"
            )));
        }
        self.providers.insert(name, Mutex::new(connection));
        Ok(())
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List every provider concurrently.
    ///
    /// A failing provider is reported in `failures` and never hides the
    /// tools of the others.
    pub async fn merged_tool_catalog(&self, use_cache: bool) -> MergedCatalog {
        self.merged_tool_catalog_for(use_cache, None).await
    }

    /// Like [`Self::merged_tool_catalog`], restricted to the named providers.
    ///
    /// Unknown names in `selection` are ignored.
    pub async fn merged_tool_catalog_for(
        &self,
        use_cache: bool,
        selection: Option<&[String]>,
    ) -> MergedCatalog {
        let listings = self
            .providers
            .iter()
            .filter(|(name, _)| selection.map_or(true, |s| s.iter().any(|n| n == *name)))
            .map(|(name, connection)| async move {
                let listed = connection.lock().await.list_tools(use_cache).await;
                (name, listed)
            });

        let mut catalog = MergedCatalog::default();
        for (name, listed) in join_all(listings).await {
            match listed {
                Ok(tools) => catalog.tools.extend(tools),
                Err(e) => {
                    warn!(provider = %name, error = %e, "tool provider listing failed");
                    catalog.failures.push(ProviderFailure {
                        provider: name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        catalog
            .tools
            .sort_by_key(|tool| tool.qualified_name());
        debug!(
            tools = catalog.tools.len(),
            failures = catalog.failures.len(),
            "merged tool catalog"
        );
        catalog
    }

    /// Run a batch of model tool calls.
    ///
    /// Calls are grouped by provider. Providers run concurrently, the calls
    /// of one provider run in request order over one session. The result
    /// vector lines up with `requests`.
    pub async fn dispatch_calls(
        &self,
        requests: &[ToolInvocationRequest],
    ) -> Vec<ToolInvocationResult> {
        let mut results: Vec<ToolInvocationResult> = requests
            .iter()
            .map(|request| ToolInvocationResult {
                id: request.id.clone(),
                provider: None,
                tool_name: request.name.clone(),
                outcome: ToolOutcome::failure("not dispatched"),
            })
            .collect();

        let mut groups: BTreeMap<String, Vec<(usize, String)>> = BTreeMap::new();
        for (index, request) in requests.iter().enumerate() {
            match resolve_call(&request.name, self.provider_names()) {
                Ok((provider, tool)) => {
                    results[index].provider = Some(provider.clone());
                    results[index].tool_name = tool.clone();
                    groups.entry(provider).or_default().push((index, tool));
                }
                Err(e) => {
                    warn!(tool = %request.name, "unresolvable tool call");
                    results[index].outcome = ToolOutcome::failure(e.to_string());
                }
            }
        }

        let runs = groups.into_iter().filter_map(|(provider, calls)| {
            let connection = self.providers.get(&provider)?;
            Some(async move {
                let batch: Vec<(String, serde_json::Value)> = calls
                    .iter()
                    .map(|(index, tool)| (tool.clone(), requests[*index].arguments.clone()))
                    .collect();
                let outcome = connection.lock().await.invoke_tools(&batch).await;
                (provider, calls, outcome)
            })
        });

        for (provider, calls, outcome) in join_all(runs).await {
            match outcome {
                Ok(per_call) => {
                    for ((index, _), result) in calls.into_iter().zip(per_call) {
                        results[index].outcome = match result {
                            Ok(value) => ToolOutcome::success(value),
                            Err(e) => ToolOutcome::failure(e.to_string()),
                        };
                    }
                }
                Err(e) => {
                    warn!(provider = %provider, error = %e, "tool provider unavailable");
                    let reason = e.to_string();
                    for (index, _) in calls {
                        results[index].outcome = ToolOutcome::failure(reason.clone());
                    }
                }
            }
        }

        results
    }

    /// Provider, tool and arguments of each requested call, for display.
    pub fn tool_info(&self, calls: &[ModelToolCall]) -> Vec<ToolCallInfo> {
        calls
            .iter()
            .map(|call| match resolve_call(&call.function.name, self.provider_names()) {
                Ok((provider, tool)) => ToolCallInfo {
                    provider: Some(provider),
                    tool_name: tool,
                    arguments: call.function.arguments.clone(),
                },
                Err(_) => ToolCallInfo {
                    provider: None,
                    tool_name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                },
            })
            .collect()
    }

    /// Drop every connection and cached catalog.
    pub async fn shutdown(&mut self) {
        for (name, connection) in std::mem::take(&mut self.providers) {
            let mut connection = connection.into_inner();
            connection.clear_cache();
            debug!(provider = %name, "tool provider released");
        }
    }

    /// Replace all connections with ones built from `config`.
    pub async fn reconfigure(
        &mut self,
        config: &McpServersConfig,
        connect_timeout: Duration,
    ) -> Result<()> {
        let rebuilt = Self::from_config(config, connect_timeout)?;
        self.shutdown().await;
        *self = rebuilt;
        Ok(())
    }
}
