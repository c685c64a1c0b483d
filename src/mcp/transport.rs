//! MCP transport layer.

use std::future::Future;

use async_trait::async_trait;
use rmcp::model::{ClientInfo, ProtocolVersion};
use rmcp::service::ClientInitializeError;

use super::session::{initialize_failure, McpRunningService, McpSession, RmcpSession};
use crate::error::Result;

/// How to reach one MCP server.
///
/// Each call to [`McpTransport::open`] establishes a fresh session.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Start and initialize a new session.
    async fn open(&self, provider: &str) -> Result<Box<dyn McpSession>>;

    /// Short human-readable target, for logs.
    fn describe(&self) -> String;
}

/// Run the rmcp handshake, retrying once with the 2024-11-05 protocol when
/// the server rejects the latest version.
pub(crate) async fn open_rmcp_session<F, Fut>(
    provider: &str,
    connect: F,
) -> Result<Box<dyn McpSession>>
where
    F: Fn(ClientInfo) -> Fut,
    Fut: Future<Output = std::result::Result<McpRunningService, ClientInitializeError>>,
{
    let latest_client_info = ClientInfo {
        protocol_version: ProtocolVersion::LATEST,
        ..Default::default()
    };

    let service = match connect(latest_client_info).await {
        Ok(service) => service,
        Err(error) if should_retry_protocol_fallback(&error) => {
            let fallback_client_info = ClientInfo {
                protocol_version: ProtocolVersion::V_2024_11_05,
                ..Default::default()
            };
            connect(fallback_client_info)
                .await
                .map_err(|e| initialize_failure(provider, e))?
        }
        Err(error) => return Err(initialize_failure(provider, error)),
    };
    Ok(Box::new(RmcpSession::new(provider, service)))
}

fn should_retry_protocol_fallback(error: &ClientInitializeError) -> bool {
    match error {
        ClientInitializeError::JsonRpcError(error) => {
            let message = error.message.to_ascii_lowercase();
            message.contains("protocol") && message.contains("version")
        }
        _ => false,
    }
}

mod http;
mod stdio;

pub use http::StreamableHttpTransport;
pub use stdio::StdioTransport;
