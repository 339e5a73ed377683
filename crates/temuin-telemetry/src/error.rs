//! Error types for telemetry operations.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
    /// The requested log format name is not recognised.
    #[error("unknown log format")]
    UnknownFormat {
        /// Value supplied by the caller.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use tracing_subscriber::util::SubscriberInitExt;

    fn try_init_error() -> Option<tracing_subscriber::util::TryInitError> {
        match tracing_subscriber::registry().try_init() {
            Ok(()) => tracing_subscriber::registry().try_init().err(),
            Err(err) => Some(err),
        }
    }

    #[test]
    fn telemetry_error_display_and_source() {
        let init_error = try_init_error().expect("second install fails");
        let err = TelemetryError::SubscriberInstall { source: init_error };
        assert_eq!(err.to_string(), "failed to install tracing subscriber");
        assert!(err.source().is_some());

        let unknown = TelemetryError::UnknownFormat {
            value: "xml".into(),
        };
        assert_eq!(unknown.to_string(), "unknown log format");
        assert!(unknown.source().is_none());
    }
}
