//! # Design
//!
//! - One error type for every client operation so callers match on a single enum.
//! - Keep messages constant while carrying context fields for diagnostics.
//! - `Clone` so a single refresh failure can be fanned out to every queued caller.

use serde_json::Value;
use thiserror::Error;

use temuin_api_models::ErrorBody;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Client-level error type.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The backend answered with a non-success status.
    #[error("request failed with status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error document, or a generic fallback.
        message: String,
        /// Raw JSON body when the response carried one.
        body: Option<Value>,
    },
    /// The request never produced a response.
    #[error("transport failure")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure description.
        detail: String,
    },
    /// A response body could not be decoded into the expected shape.
    #[error("response decoding failed")]
    Decode {
        /// What was being decoded.
        context: String,
        /// Underlying serde error.
        detail: String,
    },
    /// Local validation rejected the operation before any network call.
    #[error("validation failed")]
    Validation {
        /// User-facing reason.
        message: String,
    },
    /// A guarded operation is already in flight.
    #[error("operation already in progress")]
    Busy {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The in-flight credential refresh was dropped before it settled.
    #[error("credential refresh abandoned")]
    RefreshAbandoned,
    /// Reading or writing persisted client state failed.
    #[error("client storage failure")]
    Storage {
        /// Underlying failure description.
        detail: String,
    },
}

impl ClientError {
    /// Build a status error from a response body, extracting the server message.
    #[must_use]
    pub fn from_status(status: u16, bytes: &[u8]) -> Self {
        let body = serde_json::from_slice::<Value>(bytes).ok();
        let message = body
            .as_ref()
            .and_then(|value| serde_json::from_value::<ErrorBody>(value.clone()).ok())
            .and_then(|doc| doc.describe().map(str::to_string))
            .or_else(|| {
                let text = String::from_utf8_lossy(bytes).trim().to_string();
                (!text.is_empty() && body.is_none()).then_some(text)
            })
            .unwrap_or_else(|| format!("request failed with status {status}"));
        Self::Status {
            status,
            message,
            body,
        }
    }

    /// Local validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether this is a `401 Unauthorized` response.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }

    /// Text suitable for a notification or inline error.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { message, .. } | Self::Validation { message } => message.clone(),
            Self::Transport { operation, detail } => format!("{operation} failed: {detail}"),
            Self::Decode { context, detail } => format!("unexpected {context}: {detail}"),
            Self::Busy { operation } => format!("{operation} is already in progress"),
            Self::RefreshAbandoned => "session refresh was interrupted".to_string(),
            Self::Storage { detail } => format!("could not access local state: {detail}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_status_prefers_error_document_message() {
        let err = ClientError::from_status(401, br#"{"message":"Invalid credentials"}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.user_message(), "Invalid credentials");
        assert!(matches!(
            err,
            ClientError::Status { body: Some(ref body), .. } if body == &json!({"message": "Invalid credentials"})
        ));
    }

    #[test]
    fn from_status_falls_back_to_plain_text_and_generic_text() {
        let text = ClientError::from_status(500, b"upstream exploded");
        assert_eq!(text.user_message(), "upstream exploded");

        let empty = ClientError::from_status(503, b"");
        assert_eq!(empty.user_message(), "request failed with status 503");
        assert_eq!(empty.to_string(), "request failed with status 503");

        let json_without_message = ClientError::from_status(404, br#"{"status":"missing"}"#);
        assert_eq!(
            json_without_message.user_message(),
            "request failed with status 404"
        );
    }

    #[test]
    fn busy_and_validation_messages() {
        assert_eq!(
            ClientError::Busy {
                operation: "booking"
            }
            .user_message(),
            "booking is already in progress"
        );
        assert_eq!(
            ClientError::validation("select a provider").user_message(),
            "select a provider"
        );
    }
}
