//! Outbound HTTP access
//!
//! The pipeline only ever issues GET requests that return JSON, so the seam is
//! a single-method trait. `HttpTransport` is the reqwest implementation; tests
//! substitute an in-memory backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as HttpClient;
use serde_json::Value;
use tracing::debug;
use wsapi_error::{TrackerError, TrackerResult, TransportError};

use crate::config::ClientConfig;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "ZSESSIONID";

//-----------------------------------------------------------------------------
// Transport Trait
//-----------------------------------------------------------------------------

/// Issues one GET request and decodes the JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Value, TransportError>;
}

//-----------------------------------------------------------------------------
// Reqwest Transport
//-----------------------------------------------------------------------------

/// reqwest-backed transport sharing one connection pool across workers
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Pooled HTTP client
    http_client: HttpClient,

    /// Per-request timeout, reported in timeout errors
    timeout: Duration,
}

impl HttpTransport {
    /// Builds a transport from the client settings and an optional API key
    pub fn new(config: &ClientConfig, api_key: Option<&str>) -> TrackerResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let name = HeaderName::from_bytes(API_KEY_HEADER.as_bytes())
                .map_err(|e| TrackerError::Config(format!("invalid API key header: {e}")))?;
            let mut value = HeaderValue::from_str(key)
                .map_err(|e| TrackerError::Config(format!("invalid API key header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let timeout = config.request_timeout();
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| TrackerError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Value, TransportError> {
        debug!(url, "GET");

        let response = self
            .http_client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        url: url.to_string(),
                        timeout: self.timeout,
                    }
                } else {
                    TransportError::Connection {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| TransportError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}
