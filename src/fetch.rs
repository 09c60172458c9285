use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error::ScrapeError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Network seam. The pipeline only ever sees this trait, so tests can drive
/// the whole batch against canned documents.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .gzip(true)
            .build()
            .map_err(|e| ScrapeError::Navigation {
                url: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            ScrapeError::Navigation {
                url: url.to_string(),
                reason: if e.is_timeout() {
                    "timed out".to_string()
                } else {
                    e.to_string()
                },
            }
        })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ScrapeError::NotFound {
                url: url.to_string(),
            });
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ScrapeError::ServerBusy {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                reason: format!("unexpected status {status}"),
            });
        }

        response.text().await.map_err(|e| ScrapeError::Navigation {
            url: url.to_string(),
            reason: format!("body read failed: {e}"),
        })
    }
}
