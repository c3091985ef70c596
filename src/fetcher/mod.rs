//! Page fetching.
//!
//! Retrieves the HTML of a target URL (and, when a render service is
//! configured, a screenshot) into an immutable [`FetchedPage`]. No retries
//! happen here; every failure is reported as a distinct [`FetchError`].

pub mod screenshot;

pub use screenshot::{HttpScreenshotProvider, ScreenshotProvider};

use crate::config::FetcherConfig;
use crate::error::FetchError;
use crate::models::FetchedPage;
use async_trait::async_trait;
use chrono::Utc;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Retrieves a page snapshot for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed fetcher with bounded timeout, redirects and body size.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_redirects: usize,
    max_body_bytes: usize,
    screenshots: Option<Arc<dyn ScreenshotProvider>>,
}

impl HttpFetcher {
    /// Create a fetcher from configuration.
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(config.timeout_seconds);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {}", e)))?;

        let screenshots = match config.screenshot_url {
            Some(ref endpoint) => {
                let provider = HttpScreenshotProvider::new(endpoint, timeout)?;
                Some(Arc::new(provider) as Arc<dyn ScreenshotProvider>)
            }
            None => None,
        };

        Ok(Self {
            client,
            timeout,
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
            screenshots,
        })
    }

    /// Replace the screenshot source.
    pub fn with_screenshots(mut self, provider: Arc<dyn ScreenshotProvider>) -> Self {
        self.screenshots = Some(provider);
        self
    }

    async fn fetch_html(&self, url: &Url) -> Result<(String, String), FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(FetchError::TooLarge { limit });
        }

        let final_url = response.url().to_string();
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(url, &e))? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes from {}", body.len(), final_url);
        Ok((final_url, String::from_utf8_lossy(&body).into_owned()))
    }

    /// Map a transport error onto the fetch error taxonomy.
    fn classify(&self, url: &Url, err: &reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if err.is_redirect() {
            FetchError::TooManyRedirects {
                limit: self.max_redirects,
            }
        } else if err.is_connect() {
            if is_dns_failure(err) {
                FetchError::Dns {
                    host: url.host_str().unwrap_or_default().to_string(),
                }
            } else {
                FetchError::Connect(root_cause(err))
            }
        } else {
            FetchError::Request(root_cause(err))
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        info!("Fetching page: {}", url);

        let screenshot = async {
            match self.screenshots {
                Some(ref provider) => match provider.capture(url).await {
                    Ok(shot) => Some(shot),
                    Err(e) => {
                        warn!("Screenshot capture failed for {}: {}", url, e);
                        None
                    }
                },
                None => None,
            }
        };

        let (html, screenshot) = tokio::join!(self.fetch_html(url), screenshot);
        let (final_url, html) = html?;

        Ok(FetchedPage {
            url: final_url,
            html,
            screenshot,
            fetched_at: Utc::now(),
        })
    }
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no such host")
        {
            return true;
        }
        source = cause.source();
    }
    false
}

fn root_cause(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message = cause.to_string();
        source = cause.source();
    }
    message
}
