//! Page fetching.
//!
//! [`PageFetcher`] is the seam between the crawler and the network. The real
//! implementation, [`HttpFetcher`], wraps a shared `reqwest` client and maps
//! transport outcomes onto the [`Failure`] taxonomy:
//!
//! | outcome                  | failure               |
//! |--------------------------|-----------------------|
//! | malformed URL            | `InvalidUrl`          |
//! | non-2xx status           | `HttpStatus`          |
//! | timeout                  | `Timeout`             |
//! | any other transport error| `Network`             |

use crate::errors::{AppResult, Failure};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:65.0) Gecko/20100101 Firefox/65.0";

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return its body. `timeout` overrides the default one.
    async fn fetch(&self, url: &str, timeout: Option<Duration>) -> Result<String, Failure>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(default_timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            default_timeout,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str, timeout: Option<Duration>) -> Result<String, Failure> {
        let parsed = url::Url::parse(url).map_err(|e| Failure::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Failure::InvalidUrl(url.to_string()));
        }

        let t0 = Instant::now();
        let response = self
            .client
            .get(parsed)
            .timeout(timeout.unwrap_or(self.default_timeout))
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Non-success status");
            return Err(Failure::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| map_reqwest_error(url, e))?;
        debug!(
            %url,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

fn map_reqwest_error(url: &str, e: reqwest::Error) -> Failure {
    if e.is_timeout() {
        Failure::Timeout(url.to_string())
    } else if e.is_builder() {
        Failure::InvalidUrl(format!("{url}: {e}"))
    } else if let Some(status) = e.status() {
        Failure::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        Failure::Network(format!("{url}: {e}"))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><title>ok</title></html>"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let body = fetcher.fetch(&format!("{}/story", server.uri()), None).await.unwrap();
        assert!(body.contains("<title>ok</title>"));
    }

    #[tokio::test]
    async fn test_non_success_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/gone", server.uri());
        let err = fetcher.fetch(&url, None).await.unwrap_err();
        assert_eq!(err, Failure::HttpStatus { url, status: 410 });
    }

    #[tokio::test]
    async fn test_slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/slow", server.uri());
        let err = fetcher
            .fetch(&url, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_eq!(err, Failure::Timeout(url));
    }

    #[tokio::test]
    async fn test_malformed_url_is_invalid_url() {
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch("not a url", None).await.unwrap_err();
        assert!(matches!(err, Failure::InvalidUrl(_)));

        let err = fetcher.fetch("ftp://files.example/a", None).await.unwrap_err();
        assert!(matches!(err, Failure::InvalidUrl(_)));
    }
}
