use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use super::request::RequestSpec;
use crate::config::Config;

/// Errors surfaced by [`NetworkClient`].
///
/// Every failure a request can hit maps onto exactly one of these; callers
/// match on the variant, not on transport internals.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The composed request URL could not be parsed.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
    /// The transport reported no connectivity, or the request timed out.
    #[error("network connection error")]
    Connection,
    /// HTTP 401.
    #[error("unauthorized")]
    Unauthorized,
    /// Any other 4xx or 5xx status.
    #[error("server error: status {0}")]
    Server(u16),
    /// 2xx response with an empty body.
    #[error("empty response body")]
    NoData,
    /// Response bytes could not be decoded into the expected shape.
    #[error("failed to decode response body: {0}")]
    Decoding(String),
    /// Any other transport-level failure.
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Generic HTTP request executor.
///
/// Thin wrapper over a shared `reqwest::Client` that executes a
/// [`RequestSpec`] and classifies the outcome. Cloning is cheap (the inner
/// client is reference-counted), so one instance is built from [`Config`]
/// and handed to everything that needs the wire.
#[derive(Debug, Clone)]
pub struct NetworkClient {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl NetworkClient {
    /// Build a client with the configured connect and total timeouts.
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// A handle to the underlying `reqwest::Client`, for collaborators that
    /// stream bodies themselves (the image cache).
    pub fn http(&self) -> reqwest::Client {
        self.http.clone()
    }

    /// Execute `spec` and decode the JSON response body into `T`.
    pub async fn request<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T, NetworkError> {
        let bytes = self.request_raw(spec).await?;
        serde_json::from_slice(&bytes).map_err(|e| NetworkError::Decoding(e.to_string()))
    }

    /// Execute `spec` and return the raw response body.
    ///
    /// Emits a result exactly once: either the body bytes of a 2xx response
    /// or one [`NetworkError`]. Dropping the future cancels the underlying
    /// transfer.
    pub async fn request_raw(&self, spec: &RequestSpec) -> Result<Bytes, NetworkError> {
        let url = spec.url()?;
        let mut request = self.http.request(spec.method.clone(), url.clone());
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &spec.body {
            let encoded = serde_json::to_vec(body)
                .map_err(|e| NetworkError::RequestFailed(e.to_string()))?;
            request = request
                .header("Content-Type", "application/json")
                .body(encoded);
        }

        tracing::trace!(url = %url, method = %spec.method, "executing request");

        // The timeout covers the whole exchange, body included.
        let exchange = async {
            let response = request.send().await.map_err(classify_transport)?;
            let status = response.status().as_u16();
            match status {
                200..=299 => {
                    let bytes = response.bytes().await.map_err(classify_transport)?;
                    if bytes.is_empty() {
                        return Err(NetworkError::NoData);
                    }
                    Ok(bytes)
                }
                401 => Err(NetworkError::Unauthorized),
                400..=599 => Err(NetworkError::Server(status)),
                _ => Err(NetworkError::RequestFailed(format!(
                    "unexpected status {status}"
                ))),
            }
        };

        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| NetworkError::Connection)?
    }
}

/// Collapse reqwest's transport errors onto the two variants callers care
/// about: connectivity problems are retriable by the user, everything else
/// is just a failed request.
fn classify_transport(error: reqwest::Error) -> NetworkError {
    if error.is_timeout() || error.is_connect() {
        NetworkError::Connection
    } else {
        NetworkError::RequestFailed(error.to_string())
    }
}
