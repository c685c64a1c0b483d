//! Shared test helpers: scripted MCP providers built on the public traits.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use parley::error::{ParleyError, Result};
use parley::mcp::{
    McpSession, McpToolCallResult, McpToolSchema, McpTransport, ProviderConnection,
    ToolInvocationRequest, ToolOrchestrator,
};

/// Global log of completed calls, as `provider/tool`, in completion order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn logged(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

type Handler = Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>;

#[derive(Clone)]
struct ScriptedTool {
    schema: McpToolSchema,
    delay: Duration,
    handler: Handler,
}

/// A provider whose tools answer through closures, optionally after a delay.
#[derive(Clone)]
pub struct ScriptedProvider {
    tools: Vec<ScriptedTool>,
    open_error: Option<String>,
    log: CallLog,
}

impl ScriptedProvider {
    pub fn new(log: &CallLog) -> Self {
        Self {
            tools: Vec::new(),
            open_error: None,
            log: log.clone(),
        }
    }

    pub fn unreachable(log: &CallLog, message: &str) -> Self {
        let mut provider = Self::new(log);
        provider.open_error = Some(message.to_string());
        provider
    }

    pub fn tool<F>(mut self, name: &str, delay: Duration, handler: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.tools.push(ScriptedTool {
            schema: McpToolSchema {
                name: name.to_string(),
                description: Some(format!("{name} tool")),
                input_schema: json!({"type": "object"}),
            },
            delay,
            handler: Arc::new(handler),
        });
        self
    }

    /// A tool that returns its arguments.
    pub fn echo(self, name: &str, delay: Duration) -> Self {
        self.tool(name, delay, |args| Ok(args.clone()))
    }
}

#[async_trait]
impl McpTransport for ScriptedProvider {
    async fn open(&self, provider: &str) -> Result<Box<dyn McpSession>> {
        if let Some(message) = &self.open_error {
            return Err(ParleyError::provider_unavailable(provider, message.clone()));
        }
        Ok(Box::new(ScriptedSession {
            provider: provider.to_string(),
            tools: self.tools.iter().map(|t| (t.schema.name.clone(), t.clone())).collect(),
            log: self.log.clone(),
        }))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

struct ScriptedSession {
    provider: String,
    tools: HashMap<String, ScriptedTool>,
    log: CallLog,
}

#[async_trait]
impl McpSession for ScriptedSession {
    async fn list_tools(&mut self) -> Result<Vec<McpToolSchema>> {
        let mut schemas: Vec<_> = self.tools.values().map(|t| t.schema.clone()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schemas)
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<McpToolCallResult> {
        let tool = self.tools.get(name).cloned().ok_or_else(|| ParleyError::ToolExecution {
            provider: self.provider.clone(),
            tool_name: name.to_string(),
            message: "no such tool".into(),
        })?;
        if !tool.delay.is_zero() {
            tokio::time::sleep(tool.delay).await;
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("{}/{}", self.provider, name));
        match (tool.handler)(&arguments) {
            Ok(value) => Ok(McpToolCallResult {
                structured_content: Some(value),
                text_content: None,
                content: Vec::new(),
            }),
            Err(message) => Err(ParleyError::ToolExecution {
                provider: self.provider.clone(),
                tool_name: name.to_string(),
                message,
            }),
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn orchestrator(providers: Vec<(&str, ScriptedProvider)>) -> ToolOrchestrator {
    let mut orchestrator = ToolOrchestrator::new();
    for (name, provider) in providers {
        orchestrator
            .add_provider(ProviderConnection::new(name, Box::new(provider)))
            .unwrap();
    }
    orchestrator
}

pub fn request(id: &str, name: &str, arguments: Value) -> ToolInvocationRequest {
    ToolInvocationRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// Join NDJSON lines with trailing newlines.
pub fn ndjson(lines: &[Value]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}
