//! reqwest-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ClientConfig;
use crate::transport::{KvMethod, KvRequest, KvResponse, KvTransport, TransportError};

/// Talks to a KV proxy over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for `base_url` (e.g. `http://localhost:3000`).
    ///
    /// Without a timeout, requests wait as long as the connection stays up.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(
            &config.api_base_url,
            config.request_timeout_ms.map(Duration::from_millis),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl KvTransport for HttpTransport {
    async fn send(&self, request: KvRequest) -> Result<KvResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path_and_query);
        let mut builder = match request.method {
            KvMethod::Get => self.client.get(url),
            KvMethod::Post => self.client.post(url),
            KvMethod::Delete => self.client.delete(url),
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        let body = if bytes.is_empty() {
            None
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(status, error = %e, "Response body is not JSON");
                    None
                }
            }
        };

        Ok(KvResponse { status, body })
    }
}
