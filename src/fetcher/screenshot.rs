//! Screenshot capture through an external render service.

use crate::error::FetchError;
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Produces a screenshot of a page, encoded as a `data:` URL.
#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    async fn capture(&self, url: &Url) -> Result<String, FetchError>;
}

/// Calls `GET <endpoint>?url=<target>` and expects image bytes back.
pub struct HttpScreenshotProvider {
    endpoint: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpScreenshotProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, FetchError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| FetchError::Request(format!("Invalid screenshot endpoint: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            client,
            timeout,
        })
    }
}

#[async_trait]
impl ScreenshotProvider for HttpScreenshotProvider {
    async fn capture(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("url", url.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else if e.is_connect() {
                    FetchError::Connect(format!("screenshot service {}", self.endpoint))
                } else {
                    FetchError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or("image/png")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        debug!("Captured {} byte screenshot of {}", bytes.len(), url);
        Ok(encode_data_url(&mime, &bytes))
    }
}

/// Encode raw image bytes as a base64 `data:` URL.
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_data_url() {
        assert_eq!(encode_data_url("image/png", b"abc"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let err = HttpScreenshotProvider::new("not a url", Duration::from_secs(1)).err();
        assert!(matches!(err, Some(FetchError::Request(_))));
    }

    #[tokio::test]
    async fn test_capture_from_render_service() {
        use axum::routing::get;

        let app = axum::Router::new().route(
            "/shot",
            get(|| async { ([(axum::http::header::CONTENT_TYPE, "image/jpeg")], b"jpg".to_vec()) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider =
            HttpScreenshotProvider::new(&format!("http://{}/shot", addr), Duration::from_secs(5))
                .unwrap();
        let target = Url::parse("https://example.com").unwrap();
        let shot = provider.capture(&target).await.unwrap();
        assert_eq!(shot, "data:image/jpeg;base64,anBn");
    }
}
