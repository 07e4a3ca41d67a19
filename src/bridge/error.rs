use crate::speedtest::engine::EngineError;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors returned to the caller of a control operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("{0}")]
    BadArguments(String),
    #[error("{0}")]
    Native(String),
    #[error("method not implemented: {0}")]
    NotImplemented(String),
}

impl ControlError {
    pub(crate) fn bad_arguments(message: impl Into<String>) -> Self {
        ControlError::BadArguments(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::BadArguments(_) => "BAD_ARGS",
            ControlError::Native(_) => "NATIVE_ERR",
            ControlError::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "code": self.code(), "message": self.to_string() })
    }
}

/// Failures surfaced to the subscriber as error events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Permission denied")]
    PermissionDenied,
    #[error("Location undefined")]
    LocationUndefined,
}
