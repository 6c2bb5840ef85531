//! Error types for crud-field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A raw error exactly as the socket delivered it.
///
/// Servers may reply with an object carrying a `message`, a bare string,
/// or anything else JSON can express.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteError(pub Value);

impl RemoteError {
    /// Error object with a `message` property.
    pub fn message(message: impl Into<String>) -> Self {
        Self(serde_json::json!({ "message": message.into() }))
    }

    /// Check if the raw value is falsy (null, false, 0, or empty string).
    pub fn is_falsy(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Number(n) => n.as_f64() == Some(0.0),
            Value::String(s) => s.is_empty(),
            Value::Array(_) | Value::Object(_) => false,
        }
    }
}

impl From<Value> for RemoteError {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for RemoteError {
    fn from(message: &str) -> Self {
        Self(Value::String(message.to_string()))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Errors surfaced by field bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The server (or socket) rejected the operation.
    #[error("{message}")]
    Remote {
        /// Normalized error message.
        message: String,
    },

    /// An error was signalled without any detail.
    #[error("unspecified error")]
    Unspecified,

    /// A channel name did not have the `prefix>type/id/field` shape.
    #[error("invalid channel name: {0}")]
    InvalidChannelName(String),

    /// A binding was created outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}

impl FieldError {
    /// Normalize a raw error.
    ///
    /// A truthy `message` property wins; otherwise the raw value itself
    /// becomes the message. Falsy raw errors carry no detail and map to
    /// [`FieldError::Unspecified`].
    pub fn from_remote(raw: &RemoteError) -> Self {
        if raw.is_falsy() {
            return Self::Unspecified;
        }

        if let Some(message) = raw.0.get("message") {
            let message = RemoteError(message.clone());
            if !message.is_falsy() {
                return Self::Remote {
                    message: message.to_string(),
                };
            }
        }

        Self::Remote {
            message: raw.to_string(),
        }
    }

    /// The error message, if this error came from the remote side.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote { message } => Some(message),
            _ => None,
        }
    }
}

impl From<RemoteError> for FieldError {
    fn from(raw: RemoteError) -> Self {
        Self::from_remote(&raw)
    }
}
