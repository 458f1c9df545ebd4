use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;

/// Something that can hand us the HTML of a listing page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str, user_agent: &str) -> anyhow::Result<String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        // A hung page must not hold the poller (and a pending reload) forever.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str, user_agent: &str) -> anyhow::Result<String> {
        tracing::debug!("Retrieving listing page from {url}");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await
            .context("Failed to HTTP GET listing page")?
            .error_for_status()
            .context("Listing page returned an error status")?;

        let content = response.text().await.context("No text in response")?;

        Ok(content)
    }
}
