use crate::config::ScraperConfig;
use crate::errors::FetchError;
use anyhow::Context;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

pub struct HttpClient {
    inner: reqwest::Client,
    request_delay: Duration,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // The search page is an ASP.NET form; keep its session cookie
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            request_delay: Duration::from_millis(config.request_delay_ms),
        })
    }

    /// Fetch a URL as text. One attempt; a failure is the caller's to absorb.
    pub async fn get_text(&self, url: &url::Url) -> Result<String, FetchError> {
        if !self.request_delay.is_zero() {
            sleep(self.request_delay).await;
        }

        debug!("GET {}", url);
        let resp = self.inner.get(url.clone()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(resp.text().await?)
    }
}
