use crate::config::FetcherConfig;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

impl HttpError {
    /// Rate limits, server errors and connection problems are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Status(status) => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            HttpError::Request(e) => e.is_timeout() || e.is_connect(),
        }
    }
}

/// Backoff delays: base, 2×base, 4×base … with jitter.
fn backoff(retry_base_ms: u64, max_retries: usize) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor((retry_base_ms / 2).max(1))
        .max_delay(Duration::from_secs(30))
        .map(jitter)
        .take(max_retries)
}

pub struct HttpClient {
    inner: reqwest::Client,
    max_retries: usize,
    retry_base_ms: u64,
}

impl HttpClient {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Yahoo hands out a consent cookie on first contact
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            max_retries: config.max_retries,
            retry_base_ms: config.retry_base_ms,
        })
    }

    /// GET a URL and decode its JSON body, retrying transient failures.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let client = self.inner.clone();
        let target = url.clone();

        let action = move || {
            let client = client.clone();
            let target = target.clone();
            async move {
                debug!("GET {}", target);
                let resp = client.get(target).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    warn!("HTTP {} from {}", status, resp.url());
                    return Err(HttpError::Status(status));
                }
                Ok(resp.json::<T>().await?)
            }
        };

        RetryIf::start(backoff(self.retry_base_ms, self.max_retries), action, HttpError::is_transient)
            .await
            .with_context(|| format!("Request to {url} failed"))
    }
}
