use crate::error::{FetchError, FetchErrorKind};
use crate::rate_limit::RateGate;
use rand::Rng;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// User agents to rotate through to avoid bot detection.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Configuration for the HTTP-mode fetch path.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    /// Total attempts per URL, first try included.
    pub retry_limit: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub enable_cookies: bool,
    pub enable_gzip: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_limit: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8000,
            enable_cookies: true,
            enable_gzip: true,
        }
    }
}

/// HTTP client with realistic browser headers, per-host pacing, and retry
/// with exponential backoff and jitter.
pub struct HttpFetcher {
    client: Client,
    config: HttpClientConfig,
    gate: Arc<RateGate>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig, gate: Arc<RateGate>) -> Result<Self, reqwest::Error> {
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(Self::random_user_agent())
            .cookie_store(config.enable_cookies)
            .gzip(config.enable_gzip)
            .brotli(true)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        // Default headers that mimic a real browser session.
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .unwrap(),
        );
        headers.insert("Accept-Language", "en-US,en;q=0.9".parse().unwrap());
        headers.insert("DNT", "1".parse().unwrap());
        headers.insert("Connection", "keep-alive".parse().unwrap());
        headers.insert("Upgrade-Insecure-Requests", "1".parse().unwrap());
        headers.insert("Sec-Fetch-Dest", "document".parse().unwrap());
        headers.insert("Sec-Fetch-Mode", "navigate".parse().unwrap());
        headers.insert("Sec-Fetch-Site", "none".parse().unwrap());
        builder = builder.default_headers(headers);

        let client = builder.build()?;
        Ok(Self {
            client,
            config,
            gate,
        })
    }

    fn random_user_agent() -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
    }

    /// Exponential backoff with +/-25% jitter to avoid thundering herd.
    pub(crate) fn retry_delay(&self, attempt: usize) -> Duration {
        let base = self.config.retry_base_delay_ms;
        let capped = (base * 2u64.saturating_pow(attempt as u32)).min(self.config.retry_max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }

    /// Transient statuses worth another attempt: rate limiting, server
    /// errors, and the Cloudflare 52x range.
    pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status.as_u16(),
            429 | 500 | 502 | 503 | 504 | 520..=527
        )
    }

    /// Fetch a URL and return its HTML body plus the final status code.
    ///
    /// Every attempt, retries included, goes through the rate gate, so
    /// backoff never lets a burst of retries beat the per-host pacing.
    /// 4xx statuses other than 429 fail immediately; partial bodies are
    /// never returned as success.
    pub async fn fetch_html(&self, url: &str) -> Result<(String, u16), FetchError> {
        let host = RateGate::host_of(url).ok_or_else(|| {
            FetchError::new(url, FetchErrorKind::Network, 0, "malformed URL".to_string())
        })?;

        let mut last: Option<FetchError> = None;

        for attempt in 1..=self.config.retry_limit.max(1) {
            self.gate.acquire(&host).await;

            // Rotate user agent per attempt.
            let request = self
                .client
                .get(url)
                .header("User-Agent", Self::random_user_agent());

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return Ok((body, status.as_u16())),
                            Err(e) => {
                                // Body read failures count as network errors
                                // and are retried like any other.
                                last = Some(FetchError::new(
                                    url,
                                    FetchErrorKind::Network,
                                    attempt,
                                    format!("body read failed: {}", e),
                                ));
                            }
                        }
                    } else if Self::is_retryable_status(status) {
                        log::warn!(
                            "retryable status {} for {} (attempt {}/{})",
                            status,
                            url,
                            attempt,
                            self.config.retry_limit
                        );
                        last = Some(FetchError::http_status(url, status.as_u16(), attempt));
                    } else {
                        // Plain 4xx: not transient, do not burn retries.
                        return Err(FetchError::http_status(url, status.as_u16(), attempt));
                    }
                }
                Err(e) => {
                    let kind = if e.is_timeout() {
                        FetchErrorKind::Timeout
                    } else {
                        FetchErrorKind::Network
                    };
                    log::warn!(
                        "request failed for {} (attempt {}/{}): {}",
                        url,
                        attempt,
                        self.config.retry_limit,
                        e
                    );
                    last = Some(FetchError::new(url, kind, attempt, e.to_string()));
                }
            }

            if attempt < self.config.retry_limit {
                sleep(self.retry_delay(attempt - 1)).await;
            }
        }

        Err(last.unwrap_or_else(|| {
            FetchError::new(
                url,
                FetchErrorKind::Network,
                self.config.retry_limit,
                "no attempt made".to_string(),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fetcher(config: HttpClientConfig) -> HttpFetcher {
        HttpFetcher::new(config, Arc::new(RateGate::new(Duration::ZERO))).unwrap()
    }

    #[test]
    fn retryable_status_classification() {
        assert!(HttpFetcher::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(HttpFetcher::is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(HttpFetcher::is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(HttpFetcher::is_retryable_status(StatusCode::from_u16(522).unwrap()));
        assert!(!HttpFetcher::is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!HttpFetcher::is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn retry_delay_grows_and_respects_ceiling() {
        let client = fetcher(HttpClientConfig {
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 400,
            ..HttpClientConfig::default()
        });
        let d0 = client.retry_delay(0);
        let d3 = client.retry_delay(3);
        assert!(d0.as_millis() >= 75);
        // Ceiling plus maximum jitter.
        assert!(d3.as_millis() <= 500);
    }

    #[test]
    fn random_user_agent_comes_from_pool() {
        assert!(USER_AGENTS.contains(&HttpFetcher::random_user_agent()));
    }

    #[tokio::test]
    async fn malformed_url_fails_without_attempt() {
        let client = fetcher(HttpClientConfig::default());
        let err = client.fetch_html("not a url").await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Network);
        assert_eq!(err.attempts, 0);
    }
}
