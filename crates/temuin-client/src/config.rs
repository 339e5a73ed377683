//! Client configuration.
//!
//! # Design
//! - Plain data with sensible defaults; binaries fill it from flags/env.
//! - The payment amount is a fixture injected here, not a pricing rule.

use std::time::Duration;

use url::Url;

use crate::error::{ClientError, ClientResult};

/// Default backend address.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default freshness window for cached queries.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(10);
/// Placeholder amount charged per booking.
pub const DEFAULT_PAYMENT_AMOUNT: u64 = 100_000;
/// Placeholder currency for booking payments.
pub const DEFAULT_PAYMENT_CURRENCY: &str = "IDR";

/// Amount and currency used when creating payment intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPolicy {
    /// Amount in the smallest currency unit.
    pub amount: u64,
    /// ISO currency code.
    pub currency: String,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            amount: DEFAULT_PAYMENT_AMOUNT,
            currency: DEFAULT_PAYMENT_CURRENCY.to_string(),
        }
    }
}

/// Settings shared by every component of the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL.
    pub base_url: Url,
    /// Per-request timeout for the HTTP transport.
    pub timeout: Duration,
    /// How long cached query data stays fresh.
    pub stale_time: Duration,
    /// Booking payment fixture.
    pub payment: PaymentPolicy,
}

impl ClientConfig {
    /// Configuration pointing at `base_url` with default tuning.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            stale_time: DEFAULT_STALE_TIME,
            payment: PaymentPolicy::default(),
        }
    }

    /// Parse `base_url` and build a configuration with default tuning.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `base_url` is not an absolute HTTP URL.
    pub fn for_url(base_url: &str) -> ClientResult<Self> {
        parse_base_url(base_url).map(Self::new)
    }
}

/// Parse and validate a backend base URL.
///
/// # Errors
///
/// Returns a validation error for unparsable or non-HTTP URLs.
pub fn parse_base_url(input: &str) -> ClientResult<Url> {
    let url = Url::parse(input.trim())
        .map_err(|err| ClientError::validation(format!("invalid URL '{input}': {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::validation(format!(
            "unsupported URL scheme '{}'",
            url.scheme()
        )));
    }
    Ok(url)
}
