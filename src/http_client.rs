use crate::error::{Error, Result};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for the HTTP client used by every adapter
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub max_retries: usize,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub enable_cookies: bool,
    pub enable_gzip: bool,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_retry_delay_ms: 500,
            max_retry_delay_ms: 8000,
            enable_cookies: true,
            enable_gzip: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Fetch capability handed to matchers through the page context.
///
/// Transient failures (timeouts, 429, 5xx) are retried with exponential
/// backoff before a page is reported as failed.
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .cookie_store(config.enable_cookies)
            .gzip(config.enable_gzip)
            .brotli(config.enable_gzip)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .default_headers(headers)
            .build()
            .map_err(Error::Client)?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Calculate retry delay with exponential backoff and jitter
    fn calculate_retry_delay(&self, attempt: usize) -> Duration {
        let base_delay = self.config.initial_retry_delay_ms;
        let max_delay = self.config.max_retry_delay_ms;

        let delay_ms = base_delay
            .saturating_mul(2u64.saturating_pow(attempt as u32))
            .min(max_delay);

        // +-25% so parallel consumers do not retry in lockstep
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((delay_ms as f64 * jitter) as u64)
    }

    /// Check if a status code is worth another attempt
    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status.as_u16(),
            429 | 500 | 502 | 503 | 504 | 520 | 521 | 522 | 523 | 524 | 525 | 526 | 527
        )
    }

    /// Send the request built by `build`, retrying transient failures.
    /// A final non-success status becomes [`Error::Status`].
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match build(&self.client).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if Self::is_retryable_status(status) && attempt < self.config.max_retries {
                        log::warn!(
                            "Received retryable status {} for {}, attempt {}/{}",
                            status,
                            url,
                            attempt + 1,
                            self.config.max_retries + 1
                        );
                        sleep(self.calculate_retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Status {
                        url: url.to_string(),
                        status,
                    });
                }
                Err(e) => {
                    let should_retry = e.is_timeout() || e.is_connect();
                    if should_retry && attempt < self.config.max_retries {
                        log::warn!(
                            "Request failed for {}, attempt {}/{}: {}",
                            url,
                            attempt + 1,
                            self.config.max_retries + 1,
                            e
                        );
                        sleep(self.calculate_retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Http {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    /// Fetch a URL and return the response text
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.get_text_with_headers(url, &BTreeMap::new()).await
    }

    /// Fetch a URL with extra request headers and return the response text
    pub async fn get_text_with_headers(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<String> {
        let extra = to_header_map(headers)?;
        let response = self
            .send_with_retry(url, |client| client.get(url).headers(extra.clone()))
            .await?;
        log::debug!("GET {} -> {}", url, response.status());
        read_text(url, response).await
    }

    /// POST a JSON body and decode the JSON answer
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .send_with_retry(url, |client| client.post(url).json(body))
            .await?;
        log::debug!("POST {} -> {}", url, response.status());
        let text = read_text(url, response).await?;
        serde_json::from_str(&text).map_err(|source| Error::Json {
            url: url.to_string(),
            source,
        })
    }
}

async fn read_text(url: &str, response: Response) -> Result<String> {
    response.text().await.map_err(|source| Error::Http {
        url: url.to_string(),
        source,
    })
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::parse(format!("invalid header name {:?}", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::parse(format!("invalid value for header {}", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::new();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_builder_failure_is_a_client_error() {
        let config = HttpClientConfig {
            user_agent: "broken\nagent".to_string(),
            ..HttpClientConfig::default()
        };
        let err = HttpClient::with_config(config).err().unwrap();
        assert!(matches!(err, Error::Client(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        assert!(err.to_string().starts_with("failed to build the HTTP client"));
    }

    #[tokio::test]
    async fn test_retry_delay_calculation() {
        let config = HttpClientConfig {
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 1000,
            ..HttpClientConfig::default()
        };
        let client = HttpClient::with_config(config).unwrap();

        let delay0 = client.calculate_retry_delay(0);
        let delay3 = client.calculate_retry_delay(3);
        let delay10 = client.calculate_retry_delay(10);

        assert!(delay0.as_millis() >= 75 && delay0.as_millis() <= 125);
        assert!(delay3.as_millis() >= 600 && delay3.as_millis() <= 1000);
        // capped at max_retry_delay_ms before jitter
        assert!(delay10.as_millis() <= 1250);
    }

    #[test]
    fn test_retryable_status() {
        assert!(HttpClient::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(HttpClient::is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(HttpClient::is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(HttpClient::is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(HttpClient::is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!HttpClient::is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!HttpClient::is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_header_map_conversion() {
        let mut headers = BTreeMap::new();
        headers.insert("Referer".to_string(), "https://komiic.com/comic/1".to_string());
        let map = to_header_map(&headers).unwrap();
        assert_eq!(map.get("referer").unwrap(), "https://komiic.com/comic/1");

        headers.insert("bad header".to_string(), "x".to_string());
        assert!(to_header_map(&headers).is_err());
    }
}
