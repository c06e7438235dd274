//! Submission of sync batches to the Rollcall server.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use thiserror::Error;

use rollcall_core::wire::{ErrorBody, SyncItem, SyncResult};

/// Header carrying the authenticated user id.
const USER_ID_HEADER: &str = "x-user-id";

/// Upper bound on one submission, connect included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Something that can deliver a batch and return per-item outcomes.
pub trait SyncTransport: Send + Sync {
    fn submit(
        &self,
        owner_id: &str,
        items: &[SyncItem],
    ) -> impl Future<Output = Result<Vec<SyncResult>, TransportError>> + Send;
}

/// HTTP transport against `POST /sync/attendance`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base_url = base_url.trim_end_matches('/');
        if base_url.is_empty() {
            return Err(TransportError::Config("server URL is empty".into()));
        }

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn owner_headers(owner_id: &str) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(owner_id)
            .map_err(|_| TransportError::Config("Invalid owner id".into()))?;
        headers.insert(USER_ID_HEADER, value);
        Ok(headers)
    }

    /// Turn a non-success response into an error, using the server's error
    /// body when it has one.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("Unknown").into(),
        };
        Err(TransportError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl SyncTransport for HttpTransport {
    async fn submit(
        &self,
        owner_id: &str,
        items: &[SyncItem],
    ) -> Result<Vec<SyncResult>, TransportError> {
        let resp = self
            .http
            .post(self.url("/sync/attendance"))
            .headers(Self::owner_headers(owner_id)?)
            .json(items)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }
}
