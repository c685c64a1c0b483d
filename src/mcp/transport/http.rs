use async_trait::async_trait;
use rmcp::service::ServiceExt;
use rmcp::transport::StreamableHttpClientTransport;
use tracing::debug;

use super::{open_rmcp_session, McpTransport};
use crate::error::Result;
use crate::mcp::session::McpSession;

/// Remote MCP server reached over streamable HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamableHttpTransport {
    url: String,
}

impl StreamableHttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn open(&self, provider: &str) -> Result<Box<dyn McpSession>> {
        debug!(provider, url = %self.url, "connecting to MCP server");
        open_rmcp_session(provider, |client_info| {
            let transport = StreamableHttpClientTransport::from_uri(self.url.as_str());
            async move { client_info.into_dyn().serve(transport).await }
        })
        .await
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_itself_by_url() {
        let transport = StreamableHttpTransport::new("https://tools.example.com/mcp");
        assert_eq!(transport.url(), "https://tools.example.com/mcp");
        assert_eq!(transport.describe(), "https://tools.example.com/mcp");
    }
}
