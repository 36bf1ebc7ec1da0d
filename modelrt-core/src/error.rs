//! Core error types.

use thiserror::Error;

/// Errors from the runtime core.
///
/// Registry look-ups never produce these; a missing kind, instance or link is
/// an empty result, not an error.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown kind: {kind}")]
    UnknownKind { kind: String },

    #[error("kind mismatch: {kind} is not a {expected}")]
    KindMismatch { kind: String, expected: &'static str },

    #[error("unknown attribute '{name}' on {kind}")]
    UnknownAttribute { kind: String, name: String },

    #[error("invalid value for attribute '{name}' on {kind}: {reason}")]
    AttributeType {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("invalid transition table: {reason}")]
    InvalidDefinition { reason: String },

    #[error("invalid timer duration: {secs}s")]
    InvalidDuration { secs: f64 },

    #[error("no async runtime available to drive timers")]
    NoTimerDriver,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns a stable code suitable for log lines.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::UnknownKind { .. } => "UNKNOWN_KIND",
            CoreError::KindMismatch { .. } => "KIND_MISMATCH",
            CoreError::UnknownAttribute { .. } => "UNKNOWN_ATTRIBUTE",
            CoreError::AttributeType { .. } => "ATTRIBUTE_TYPE",
            CoreError::InvalidDefinition { .. } => "BAD_DEFINITION",
            CoreError::InvalidDuration { .. } => "BAD_DURATION",
            CoreError::NoTimerDriver => "NO_TIMER_DRIVER",
            CoreError::Json(_) => "BAD_JSON",
        }
    }
}

/// Errors returned by external collaborators.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge '{bridge}' does not support operation '{operation}'")]
    UnsupportedOperation { bridge: String, operation: String },

    #[error("missing argument '{name}' for {operation}")]
    MissingArgument { operation: String, name: String },

    #[error("bridge unavailable: {0}")]
    Unavailable(String),
}

impl BridgeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            BridgeError::MissingArgument { .. } => "MISSING_ARGUMENT",
            BridgeError::Unavailable(_) => "BRIDGE_UNAVAILABLE",
        }
    }
}

/// Failure raised by a transition action.
///
/// Caught at the dispatch boundary; the committed transition is kept.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{what} not found")]
    Missing { what: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    /// Shorthand for a missing instance or relationship target.
    pub fn missing(what: impl Into<String>) -> Self {
        ActionError::Missing { what: what.into() }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ActionError::Missing { .. } => "ACTION_MISSING",
            ActionError::Core(e) => e.error_code(),
            ActionError::Bridge(e) => e.error_code(),
            ActionError::Failed(_) => "ACTION_FAILED",
        }
    }
}

/// Result type of transition actions.
pub type ActionResult = Result<(), ActionError>;
