//! HTTP object-store sink for result archives.

use async_trait::async_trait;
use edagate_core::{ResultSink, SinkConfig, SinkError};
use std::time::Duration;
use tracing::debug;

/// PUTs archives to `<base_url>/<key>` with an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpSink {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(config: &SinkConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("edagate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ResultSink for HttpSink {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, SinkError> {
        let url = self.object_url(key);
        debug!(%url, bytes = bytes.len(), "Uploading result archive");

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(url);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
