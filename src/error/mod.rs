//! Error types for Parley.

pub mod unified;

pub use unified::{ErrorCategory, FailureNotice, RecoverySuggestion, TransportFailure};

use thiserror::Error;

/// Primary error type for all Parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection refused, timeout, TLS failure, or a non-2xx status whose
    /// body did not match a known server error.
    #[error("Transport error ({failure}): {message}")]
    Transport {
        failure: TransportFailure,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Malformed stream line: {message}")]
    ProtocolDecode { line: String, message: String },

    #[error("Incomplete stream: {0}")]
    IncompleteStream(String),

    #[error("Model '{model}' is not installed")]
    ModelNotInstalled { model: String, suggestion: String },

    #[error("Custom model '{model}' is broken: cannot use '{file}'")]
    CustomModel { model: String, file: String },

    #[error("No tool provider matches tool '{tool_name}'")]
    UnknownProvider { tool_name: String },

    #[error("Tool provider '{provider}' unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Tool '{tool_name}' on '{provider}' failed: {message}")]
    ToolExecution {
        provider: String,
        tool_name: String,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ParleyError {
    /// Create a transport error without an underlying source.
    pub fn transport(failure: TransportFailure, message: impl Into<String>) -> Self {
        Self::Transport {
            failure,
            message: message.into(),
            source: None,
        }
    }

    /// Create a provider-unavailable error.
    pub fn provider_unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } | Self::Timeout(_) => ErrorCategory::Transport,
            Self::ProtocolDecode { .. } | Self::IncompleteStream(_) | Self::Serialization(_) => {
                ErrorCategory::Protocol
            }
            Self::ModelNotInstalled { .. } => ErrorCategory::ModelNotInstalled,
            Self::CustomModel { .. } => ErrorCategory::CustomModel,
            Self::UnknownProvider { .. } | Self::ProviderUnavailable { .. } => {
                ErrorCategory::ToolProvider
            }
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Configuration(_) | Self::InvalidArgument(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Whether a user-triggered retry can succeed once the cause is fixed.
    ///
    /// Nothing is ever retried automatically.
    pub fn is_user_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::ModelNotInstalled
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::ModelNotInstalled => RecoverySuggestion::InstallModel,
            ErrorCategory::CustomModel => RecoverySuggestion::RebuildCustomModel,
            ErrorCategory::Transport => RecoverySuggestion::CheckConnectivity,
            ErrorCategory::ToolProvider => RecoverySuggestion::CheckProviderConfiguration,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            _ => RecoverySuggestion::ReportIssue,
        }
    }

    /// Short title plus remediation message for a notification sink.
    pub fn notice(&self) -> FailureNotice {
        match self {
            Self::ModelNotInstalled { suggestion, .. } => {
                FailureNotice::new(self.to_string(), Some(suggestion.clone()))
            }
            Self::CustomModel { model, file } => {
                FailureNotice::new(self.to_string(), Some(format!("Model: {model}, File: {file}")))
            }
            Self::Transport { failure, .. } => FailureNotice::new(
                format!("Inference server unreachable ({failure})"),
                Some(self.to_string()),
            ),
            other => FailureNotice::new(other.to_string(), None),
        }
    }
}

impl From<reqwest::Error> for ParleyError {
    fn from(error: reqwest::Error) -> Self {
        let failure = TransportFailure::classify(&error);
        Self::Transport {
            failure,
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ParleyError>;
