//! Error types for Trellis.

use thiserror::Error;

/// Primary error type for all Trellis operations.
#[derive(Error, Debug)]
pub enum TrellisError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Duplicate agent name in tree: {0}")]
    DuplicateAgentName(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionAlreadyExists(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Agent error ({agent}): {message}")]
    Agent { agent: String, message: String },

    #[error("Model error ({model}): {message}")]
    Model { model: String, message: String },

    #[error("Tool execution error ({tool_name}): {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<TrellisError>>,
    },

    #[error("Invocation canceled")]
    Canceled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an error, used by callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid wiring detected at build time (duplicate names, bad config).
    Construction,
    /// A turn could not resolve its session.
    Resolution,
    /// The resolved agent or model cannot honour the requested mode.
    Capability,
    /// An agent, model or tool failed (or was interrupted) while driving a turn.
    Execution,
    /// Durable storage rejected a write.
    Persistence,
    Serialization,
}

impl TrellisError {
    /// Create an agent execution error.
    pub fn agent(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Agent {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Create a model error.
    pub fn model(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Model {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Wrap a storage failure, keeping the underlying error as the source.
    pub fn persistence(message: impl Into<String>, source: TrellisError) -> Self {
        Self::Persistence {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::DuplicateAgentName(_) => ErrorCategory::Construction,
            Self::SessionNotFound(_) => ErrorCategory::Resolution,
            Self::UnsupportedOperation(_) => ErrorCategory::Capability,
            Self::Persistence { .. } | Self::SessionAlreadyExists(_) | Self::Io(_) => {
                ErrorCategory::Persistence
            }
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::ArtifactNotFound(_)
            | Self::Agent { .. }
            | Self::Model { .. }
            | Self::ToolExecution { .. }
            | Self::Canceled
            | Self::InvalidArgument(_) => ErrorCategory::Execution,
        }
    }

    /// Whether this error came from an interrupted suspension point.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Whether this error is potentially retryable.
    ///
    /// The core never retries on its own; retry is a caller policy.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TrellisError>;
