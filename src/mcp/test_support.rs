use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::schema::{McpToolCallResult, McpToolSchema};
use super::session::McpSession;
use super::transport::McpTransport;
use crate::error::{ParleyError, Result};

#[derive(Default)]
pub(crate) struct MockStats {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub lists: AtomicUsize,
    pub calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("call log lock should not be poisoned")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[derive(Clone)]
pub(crate) struct MockTransport {
    tools: Vec<McpToolSchema>,
    results: HashMap<String, std::result::Result<serde_json::Value, String>>,
    open_error: Option<String>,
    open_delay: Duration,
    pub stats: Arc<MockStats>,
}

impl MockTransport {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names.iter().map(|name| test_tool(name)).collect(),
            results: HashMap::new(),
            open_error: None,
            open_delay: Duration::ZERO,
            stats: Arc::new(MockStats::default()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut transport = Self::with_tools(&[]);
        transport.open_error = Some(message.to_string());
        transport
    }

    pub fn returning(mut self, tool: &str, value: serde_json::Value) -> Self {
        self.results.insert(tool.to_string(), Ok(value));
        self
    }

    pub fn erroring(mut self, tool: &str, message: &str) -> Self {
        self.results.insert(tool.to_string(), Err(message.to_string()));
        self
    }

    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }
}

#[async_trait]
impl McpTransport for MockTransport {
    async fn open(&self, provider: &str) -> Result<Box<dyn McpSession>> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if let Some(message) = &self.open_error {
            return Err(ParleyError::provider_unavailable(provider, message.clone()));
        }
        Ok(Box::new(MockSession {
            provider: provider.to_string(),
            transport: self.clone(),
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

struct MockSession {
    provider: String,
    transport: MockTransport,
    closed: bool,
}

#[async_trait]
impl McpSession for MockSession {
    async fn list_tools(&mut self) -> Result<Vec<McpToolSchema>> {
        self.transport.stats.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport.tools.clone())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolCallResult> {
        self.transport
            .stats
            .calls
            .lock()
            .expect("call log lock should not be poisoned")
            .push((name.to_string(), arguments));
        match self.transport.results.get(name) {
            Some(Ok(value)) => Ok(McpToolCallResult {
                structured_content: Some(value.clone()),
                text_content: None,
                content: Vec::new(),
            }),
            Some(Err(message)) => Err(ParleyError::ToolExecution {
                provider: self.provider.clone(),
                tool_name: name.to_string(),
                message: message.clone(),
            }),
            None => Err(ParleyError::ToolExecution {
                provider: self.provider.clone(),
                tool_name: name.to_string(),
                message: "missing mock tool call result".into(),
            }),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.transport.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub(crate) fn test_tool(name: &str) -> McpToolSchema {
    McpToolSchema {
        name: name.into(),
        description: Some(format!("{name} description")),
        input_schema: json!({
            "type": "object",
            "properties": {
                "q": { "type": "string" }
            }
        }),
    }
}
