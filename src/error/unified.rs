//! Error classification and user-facing recovery hints.

use std::error::Error as _;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a request to the inference server never produced a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFailure {
    /// The server could not be reached at all.
    Refused,
    Timeout,
    Tls,
    /// The server answered with a non-2xx status and an unrecognized body.
    Status(u16),
    /// The connection dropped mid-response.
    Interrupted,
    Other,
}

impl TransportFailure {
    /// Classify a reqwest failure.
    pub fn classify(error: &reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::Status(status.as_u16());
        }
        if error.is_timeout() {
            return Self::Timeout;
        }
        if mentions_tls(error) {
            return Self::Tls;
        }
        if error.is_connect() {
            return Self::Refused;
        }
        if error.is_body() || error.is_decode() {
            return Self::Interrupted;
        }
        Self::Other
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused => f.write_str("connection refused"),
            Self::Timeout => f.write_str("timeout"),
            Self::Tls => f.write_str("tls"),
            Self::Status(code) => write!(f, "status {code}"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Other => f.write_str("network"),
        }
    }
}

fn mentions_tls(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Protocol,
    ModelNotInstalled,
    CustomModel,
    ToolProvider,
    ToolExecution,
    Configuration,
    Io,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    InstallModel,
    RebuildCustomModel,
    CheckConnectivity,
    CheckProviderConfiguration,
    CheckConfiguration,
    ReportIssue,
}

/// A short failure title with an optional remediation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNotice {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FailureNotice {
    pub fn new(title: impl Into<String>, message: Option<String>) -> Self {
        Self {
            title: title.into(),
            message,
        }
    }
}
