//! HTTP transport seam.
//!
//! Everything the grid sends goes through [`Transport`], so fetch ordering,
//! view persistence, and export can be exercised against in-process fakes.
//! [`HttpTransport`] is the production implementation on top of `reqwest`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;

/// Errors from a single request.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("resource not found")]
    NotFound,
    #[error("server responded with status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Request primitives used by the grid. Paths may be relative to the
/// configured base URL or absolute.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET path?params`, returning the response body.
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Bytes, TransportError>;

    /// `POST path` with a JSON body, returning the response body.
    async fn post_json(&self, path: &str, body: serde_json::Value)
        -> Result<Bytes, TransportError>;

    /// `DELETE path`.
    async fn delete(&self, path: &str) -> Result<(), TransportError>;
}

/// Decodes a JSON response body.
///
/// # Errors
///
/// Returns [`TransportError::Decode`] if the body is not valid JSON for `T`.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, TransportError> {
    serde_json::from_slice(body).map_err(|e| TransportError::Decode(e.to_string()))
}

/// `reqwest`-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Builds the underlying client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the TLS backend fails to
    /// initialize.
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn with_user(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.user_id {
            Some(user) => req.header("X-User-Id", user),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Bytes, TransportError> {
        let resp = self.with_user(req).send().await.map_err(map_reqwest)?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }
        resp.bytes().await.map_err(map_reqwest)
    }
}

fn map_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Bytes, TransportError> {
        let url = self.config.resolve(path);
        debug!(%url, params = params.len(), "GET");
        self.send(self.client.get(url).query(params)).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Bytes, TransportError> {
        let url = self.config.resolve(path);
        debug!(%url, "POST");
        self.send(self.client.post(url).json(&body)).await
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        let url = self.config.resolve(path);
        debug!(%url, "DELETE");
        self.send(self.client.delete(url)).await.map(|_| ())
    }
}
