use crate::config::ClientConfig;
use crate::error::{Result, RlzError};

use anyhow::anyhow;
use std::time::Duration;

/// Sends a formed request path to the financial server and returns the body.
///
/// Synchronous: callers have already passed the ping throttle.
pub trait Transport: Send + Sync {
    fn send(&self, request: &str) -> Result<String>;
}

/// HTTP transport with retry and jittered exponential backoff.
///
/// Owns a single-threaded runtime so callers stay synchronous. Must not be
/// used from inside another async runtime.
pub struct HttpTransport {
    base_url: String,
    http_client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    timeout: Duration,
    attempts: usize,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration, attempts: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RlzError::Transport(format!("failed to start runtime: {}", e)))?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RlzError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            runtime,
            timeout,
            attempts: attempts.max(1),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(
            config.server_url.clone(),
            config.request_timeout(),
            config.retry_attempts,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, url: String) -> anyhow::Result<String> {
        let response = self.get_with_retry(url, self.timeout, self.attempts).await?;
        if !response.status().is_success() {
            return Err(anyhow!("Ping request failed {}", response.status()));
        }
        Ok(response.text().await?)
    }

    async fn get_with_retry(
        &self,
        url: String,
        timeout: Duration,
        attempts: usize,
    ) -> anyhow::Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http_client
                .get(url.clone())
                .timeout(timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow!(e));
                    }
                    tracing::debug!("Ping attempt {} failed: {}", attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow!("Retry attempts exhausted"))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, request);
        tracing::info!("Sending financial ping to {}", self.base_url);
        self.runtime
            .block_on(self.fetch(url))
            .map_err(|e| RlzError::Transport(e.to_string()))
    }
}
