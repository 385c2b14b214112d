//! Native HTTP transport built on `reqwest`.

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::debug;

use crate::config::{ApiConfig, ConfigError};

use super::{ApiRequest, ApiResponse, Method, Transport, TransportFuture};

/// Issues requests with a shared `reqwest` client carrying the bearer token.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Builds the client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] without an API key, or
    /// [`ConfigError::Parse`] when the key is not a valid header value or the
    /// TLS stack cannot be initialised.
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key()?))
            .map_err(|err| ConfigError::Parse(format!("invalid API key: {err}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .use_rustls_tls()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|err| ConfigError::Parse(format!("HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim().to_owned(),
        })
    }

    async fn send(&self, request: &ApiRequest) -> ApiResponse {
        let url = request.url(&self.base_url);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        debug!(method = request.method.as_str(), %url, "sending request");

        let mut builder = self.client.request(method, &url).timeout(request.timeout);
        if let Some(body) = request.wire_body() {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return ApiResponse::transport_failure(err.to_string()),
        };
        let status = response.status().as_u16();
        match response.text().await {
            Ok(text) => ApiResponse::from_server(status, text),
            Err(err) => ApiResponse::transport_failure(format!(
                "failed to read response body (status {status}): {err}"
            )),
        }
    }
}

impl Transport for HttpTransport {
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        Box::pin(self.send(request))
    }
}
