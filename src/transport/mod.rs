//! Transport abstraction for the appliance REST API.
//!
//! A [`Transport`] turns an [`ApiRequest`] into an [`ApiResponse`] and never
//! fails: connection-level problems are folded into a server-error status so
//! callers can branch uniformly on the status code. Two implementations are
//! provided, a native HTTP client and one that shells out to `curl`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{ApiConfig, ConfigError, TransportKind};

mod curl;
mod http;
mod runner;

pub use curl::CurlTransport;
pub use http::HttpTransport;
pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner, TransportError};

/// Status reported when the request never produced an HTTP response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 503;

/// Request timeout used when callers do not override it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP methods used against the API.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case method name as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a request body is sent for this method.
    #[must_use]
    pub const fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

/// A single API call.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL.
    pub path: String,
    /// Optional JSON body.
    pub body: Option<Value>,
    /// Overall request timeout.
    pub timeout: Duration,
}

impl ApiRequest {
    /// Creates a request with the default timeout and no body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Shorthand for a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Shorthand for a `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Shorthand for a `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Attaches a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Overrides the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Body to send on the wire, if the method carries one.
    #[must_use]
    pub fn wire_body(&self) -> Option<&Value> {
        self.body.as_ref().filter(|_| self.method.carries_body())
    }

    /// Resolves the request path against `base_url`.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        if self.path.starts_with("http://") || self.path.starts_with("https://") {
            return self.path.clone();
        }
        let base = base_url.trim_end_matches('/');
        if self.path.starts_with('/') {
            format!("{base}{}", self.path)
        } else {
            format!("{base}/{}", self.path)
        }
    }
}

/// Where a response status came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseOrigin {
    /// The server answered; the status is the real HTTP status.
    Server,
    /// No HTTP exchange completed; the status is synthetic.
    Transport,
}

/// Normalised response returned by every transport.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code, or [`TRANSPORT_FAILURE_STATUS`].
    pub status: u16,
    /// Body parsed as JSON; `Value::Null` when the body is not JSON.
    pub body: Value,
    /// Raw body text, or the failure description for transport errors.
    pub text: String,
    /// Whether the status was produced by the server or synthesised.
    pub origin: ResponseOrigin,
}

impl ApiResponse {
    /// Builds a response from a completed HTTP exchange.
    #[must_use]
    pub fn from_server(status: u16, text: String) -> Self {
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self {
            status,
            body,
            text,
            origin: ResponseOrigin::Server,
        }
    }

    /// Builds a synthetic response for a connection-level failure.
    #[must_use]
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            status: TRANSPORT_FAILURE_STATUS,
            body: Value::Null,
            text: message.into(),
            origin: ResponseOrigin::Transport,
        }
    }

    /// Returns `true` when the status is one of `accepted`.
    #[must_use]
    pub fn status_in(&self, accepted: &[u16]) -> bool {
        accepted.contains(&self.status)
    }

    /// Returns `true` when no HTTP exchange completed.
    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        self.origin == ResponseOrigin::Transport
    }

    /// Decodes the JSON body into `T`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}

/// Future returned by [`Transport::call`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = ApiResponse> + Send + 'a>>;

/// Issues API calls. Implementations must not retry.
pub trait Transport: Send + Sync {
    /// Performs `request` and returns the normalised response.
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        (**self).call(request)
    }
}

/// Transport chosen from [`ApiConfig`].
#[derive(Debug)]
pub enum ConfiguredTransport {
    /// Native HTTP client.
    Http(HttpTransport),
    /// External `curl` process.
    Curl(CurlTransport<ProcessCommandRunner>),
}

impl ConfiguredTransport {
    /// Builds the transport selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is incomplete or the
    /// HTTP client cannot be constructed.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        match config.transport_kind()? {
            TransportKind::Http => Ok(Self::Http(HttpTransport::new(config)?)),
            TransportKind::Curl => Ok(Self::Curl(CurlTransport::new(
                config,
                ProcessCommandRunner,
            )?)),
        }
    }
}

impl Transport for ConfiguredTransport {
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        match self {
            Self::Http(transport) => transport.call(request),
            Self::Curl(transport) => transport.call(request),
        }
    }
}
