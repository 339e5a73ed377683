//! Application context, error classification, and notification printing.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use temuin_client::{ClientConfig, ClientError, FileStore, KeyValueStore, TemuinApp};
use temuin_events::{EventStream, Severity};
use url::Url;

use crate::cli::Cli;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) app: TemuinApp,
}

impl AppContext {
    /// Context persisting the session in the configured state file.
    pub(crate) fn from_cli(cli: &Cli) -> CliResult<Self> {
        let store = FileStore::new(cli.state_file());
        tracing::debug!(path = %store.path().display(), "using state file");
        Self::with_store(
            cli.api_url.clone(),
            Duration::from_secs(cli.timeout),
            Arc::new(store),
        )
    }

    pub(crate) fn with_store(
        base_url: Url,
        timeout: Duration,
        storage: Arc<dyn KeyValueStore>,
    ) -> CliResult<Self> {
        let mut config = ClientConfig::new(base_url);
        config.timeout = timeout;
        let app = TemuinApp::connect(config, storage).map_err(classify_client_error)?;
        Ok(Self { app })
    }
}

/// Parse the API URL provided to the CLI.
pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    temuin_client::config::parse_base_url(input).map_err(|err| err.user_message())
}

/// Classify a client error into a CLI error.
pub(crate) fn classify_client_error(err: ClientError) -> CliError {
    match err {
        ClientError::Validation { message } => CliError::validation(message),
        ClientError::Busy { .. } => CliError::validation(err.user_message()),
        ClientError::Status {
            status: 400 | 409 | 422,
            message,
            ..
        } => CliError::validation(message),
        ClientError::Status {
            status, message, ..
        } => CliError::failure(anyhow!("{message} (status {status})")),
        other => CliError::failure(anyhow!(other.user_message())),
    }
}

/// Print notifications raised while the command ran.
pub(crate) fn print_notifications(stream: &mut EventStream) {
    for envelope in stream.drain() {
        let label = match envelope.event.severity() {
            Severity::Success => "ok",
            Severity::Error => "error",
            Severity::Info => "info",
        };
        eprintln!("[{label}] {}", envelope.event.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_exit_codes() {
        let rejected = classify_client_error(ClientError::validation("provider is required"));
        assert_eq!(rejected.exit_code(), 2);
        assert_eq!(rejected.display_message(), "provider is required");

        let conflict = classify_client_error(ClientError::from_status(
            409,
            br#"{"message":"already exists"}"#,
        ));
        assert_eq!(conflict.exit_code(), 2);
        assert_eq!(conflict.display_message(), "already exists");

        let server = classify_client_error(ClientError::from_status(
            500,
            br#"{"error":"boom"}"#,
        ));
        assert_eq!(server.exit_code(), 3);
        assert_eq!(server.display_message(), "boom (status 500)");

        let busy = classify_client_error(ClientError::Busy {
            operation: "booking",
        });
        assert_eq!(busy.exit_code(), 2);
    }

    #[test]
    fn parse_url_rejects_non_http_schemes() {
        assert!(parse_url("http://127.0.0.1:8080").is_ok());
        let err = parse_url("ftp://example.com").expect_err("ftp is rejected");
        assert!(err.contains("ftp"));
    }
}
