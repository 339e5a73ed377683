//! Wire-level request/response types and the transport seam.
//!
//! # Design
//! - `ApiRequest` is plain data so the auth interceptor can replay it verbatim.
//! - `Transport` is the only place bytes hit the network; tests substitute a
//!   scripted backend.
//! - `ReqwestTransport` mirrors browser credential handling with a cookie
//!   store and tags every call with a per-process request id.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

const HEADER_REQUEST_ID: &str = "x-request-id";

/// HTTP methods used by the booking API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One outgoing API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    bearer: Option<String>,
    retry: bool,
    refresh_on_unauthorized: bool,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
            retry: false,
            refresh_on_unauthorized: true,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// `POST path`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns a decode error if `body` cannot be represented as JSON.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        let value = serde_json::to_value(body).map_err(|err| ClientError::Decode {
            context: format!("{} {} request body", self.method.as_str(), self.path),
            detail: err.to_string(),
        })?;
        self.body = Some(value);
        Ok(self)
    }

    /// Opt out of 401 interception (credential endpoints).
    #[must_use]
    pub const fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    pub(crate) fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    pub(crate) const fn into_retry(mut self) -> Self {
        self.retry = true;
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Path relative to the API base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in insertion order.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// JSON body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Bearer token attached to this attempt.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// Whether this attempt is the single permitted replay after a refresh.
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        self.retry
    }

    /// Whether a 401 on this request may trigger a refresh.
    #[must_use]
    pub const fn refreshes_on_unauthorized(&self) -> bool {
        self.refresh_on_unauthorized
    }
}

/// Raw response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a decode error naming `context` when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self, context: &str) -> ClientResult<T> {
        serde_json::from_slice(&self.body).map_err(|err| ClientError::Decode {
            context: context.to_string(),
            detail: err.to_string(),
        })
    }
}

/// Executes API requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return whatever the server answered.
    ///
    /// # Errors
    ///
    /// Returns a transport error only when no response was received.
    async fn execute(&self, request: &ApiRequest) -> ClientResult<ApiResponse>;
}

/// Transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Build a transport from client settings.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be constructed.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let mut default_headers = HeaderMap::new();
        let request_id = HeaderValue::from_str(&Uuid::new_v4().to_string()).map_err(|err| {
            ClientError::Transport {
                operation: "client.build",
                detail: err.to_string(),
            }
        })?;
        default_headers.insert(HEADER_REQUEST_ID, request_id);

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers)
            .cookie_store(true)
            .build()
            .map_err(|err| ClientError::Transport {
                operation: "client.build",
                detail: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: with_trailing_slash(config.base_url.clone()),
        })
    }

    /// Endpoint paths are resolved under the base path, never from the host root.
    fn url_for(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ClientError::validation(format!("invalid request path '{path}': {err}")))
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let url = self.url_for(request.path())?;
        let mut builder = match request.method() {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(token) = request.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| ClientError::Transport {
            operation: "request.send",
            detail: err.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| ClientError::Transport {
                operation: "response.read",
                detail: err.to_string(),
            })?
            .to_vec();
        Ok(ApiResponse { status, body })
    }
}
