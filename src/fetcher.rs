use crate::browser::{BrowserConfig, BrowserError, BrowserSession, Readiness};
use crate::error::{FetchError, FetchErrorKind};
use crate::http_client::{HttpClientConfig, HttpFetcher};
use crate::models::{FetchStatus, FetchTarget, PageType, RawPage, RenderMode};
use crate::rate_limit::RateGate;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Retry and pacing policy for one extraction run.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Total attempts per target, first try included.
    pub retry_limit: usize,
    pub request_timeout: Duration,
    pub min_request_interval: Duration,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            request_timeout: Duration::from_secs(30),
            min_request_interval: Duration::from_millis(800),
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8000,
        }
    }
}

/// Retrieves raw HTML for fetch targets, in HTTP or browser mode.
///
/// Owns the per-host rate gate and the browser session lifecycle; callers
/// never see session restarts. One `Fetcher` serves one run and is shared
/// across worker tasks behind an `Arc`.
pub struct Fetcher {
    http: HttpFetcher,
    gate: Arc<RateGate>,
    policy: FetchPolicy,
    browser_config: BrowserConfig,
    /// Lazily launched, reused across renders, replaced on crash.
    /// Std mutex: only locked inside blocking render calls.
    browser: Arc<Mutex<Option<BrowserSession>>>,
    /// Host all targets must belong to.
    allowed_host: String,
}

impl Fetcher {
    pub fn new(
        base_url: &str,
        policy: FetchPolicy,
        browser_config: BrowserConfig,
    ) -> Result<Self, FetchError> {
        let allowed_host = RateGate::host_of(base_url).ok_or_else(|| {
            FetchError::new(
                base_url,
                FetchErrorKind::Network,
                0,
                "base URL has no host".to_string(),
            )
        })?;

        let gate = Arc::new(RateGate::new(policy.min_request_interval));
        let http = HttpFetcher::new(
            HttpClientConfig {
                timeout: policy.request_timeout,
                retry_limit: policy.retry_limit,
                retry_base_delay_ms: policy.retry_base_delay_ms,
                retry_max_delay_ms: policy.retry_max_delay_ms,
                ..HttpClientConfig::default()
            },
            Arc::clone(&gate),
        )
        .map_err(|e| {
            FetchError::new(base_url, FetchErrorKind::Network, 0, e.to_string())
        })?;

        Ok(Self {
            http,
            gate,
            policy,
            browser_config,
            browser: Arc::new(Mutex::new(None)),
            allowed_host,
        })
    }

    /// Readiness condition for rendered pages, per page type. Mirrors what
    /// the upstream actually populates late: match pages build their header
    /// and stats tables in JS.
    fn readiness_for(&self, page_type: PageType) -> Readiness {
        match page_type {
            PageType::MatchDetail => Readiness::Selector(".match-header".to_string()),
            _ => Readiness::Settle(Duration::from_millis(1000)),
        }
    }

    /// Fetch one target. HTTP mode delegates to the retrying HTTP client;
    /// browser mode runs the blocking render on the blocking pool with its
    /// own retry loop and session restart on crash.
    pub async fn fetch(&self, target: &FetchTarget) -> Result<RawPage, FetchError> {
        let host = RateGate::host_of(&target.url).ok_or_else(|| {
            FetchError::new(
                &target.url,
                FetchErrorKind::Network,
                0,
                "malformed URL".to_string(),
            )
        })?;
        if host != self.allowed_host {
            return Err(FetchError::new(
                &target.url,
                FetchErrorKind::Network,
                0,
                format!("host {} is not the configured upstream {}", host, self.allowed_host),
            ));
        }

        match target.render_mode {
            RenderMode::Http => {
                let (html, status) = self.http.fetch_html(&target.url).await?;
                Ok(RawPage {
                    url: target.url.clone(),
                    page_type: target.page_type,
                    html,
                    fetched_at: Utc::now(),
                    status: FetchStatus::Http(status),
                })
            }
            RenderMode::Browser => self.fetch_rendered(target, &host).await,
        }
    }

    async fn fetch_rendered(&self, target: &FetchTarget, host: &str) -> Result<RawPage, FetchError> {
        let readiness = self.readiness_for(target.page_type);
        let mut last: Option<FetchError> = None;

        for attempt in 1..=self.policy.retry_limit.max(1) {
            self.gate.acquire(host).await;

            let url = target.url.clone();
            let readiness = readiness.clone();
            let config = self.browser_config.clone();
            let slot = Arc::clone(&self.browser);

            let result = tokio::task::spawn_blocking(move || {
                render_with_session(&slot, config, &url, &readiness)
            })
            .await;

            match result {
                Ok(Ok(html)) => {
                    return Ok(RawPage {
                        url: target.url.clone(),
                        page_type: target.page_type,
                        html,
                        fetched_at: Utc::now(),
                        status: FetchStatus::Rendered,
                    });
                }
                Ok(Err(e)) => {
                    let kind = match e {
                        BrowserError::Timeout(_) => FetchErrorKind::Timeout,
                        _ => FetchErrorKind::RenderFailure,
                    };
                    log::warn!(
                        "render failed for {} (attempt {}/{}): {}",
                        target.url,
                        attempt,
                        self.policy.retry_limit,
                        e
                    );
                    last = Some(FetchError::new(&target.url, kind, attempt, e.to_string()));
                }
                Err(join_err) => {
                    last = Some(FetchError::new(
                        &target.url,
                        FetchErrorKind::RenderFailure,
                        attempt,
                        format!("render task panicked: {}", join_err),
                    ));
                }
            }

            if attempt < self.policy.retry_limit {
                sleep(self.http.retry_delay(attempt - 1)).await;
            }
        }

        Err(last.unwrap_or_else(|| {
            FetchError::new(
                &target.url,
                FetchErrorKind::RenderFailure,
                self.policy.retry_limit,
                "no render attempt made".to_string(),
            )
        }))
    }
}

/// Render inside the blocking pool: reuse the shared session when it is
/// alive, relaunch it when Chrome has died, and drop it again on fatal
/// errors so the next attempt starts fresh.
fn render_with_session(
    slot: &Mutex<Option<BrowserSession>>,
    config: BrowserConfig,
    url: &str,
    readiness: &Readiness,
) -> Result<String, BrowserError> {
    let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let needs_launch = match guard.as_ref() {
        Some(session) => {
            if session.is_healthy() {
                false
            } else {
                log::warn!("browser session died, relaunching");
                true
            }
        }
        None => true,
    };

    if needs_launch {
        *guard = Some(BrowserSession::launch(config)?);
    }

    let session = match guard.as_ref() {
        Some(s) => s,
        None => return Err(BrowserError::Launch("session missing after launch".to_string())),
    };
    match session.render(url, readiness) {
        Ok(html) => Ok(html),
        Err(e) => {
            if e.is_session_fatal() {
                *guard = None;
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RenderMode;

    fn fetcher() -> Fetcher {
        Fetcher::new(
            "https://www.vlr.gg",
            FetchPolicy::default(),
            BrowserConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn cross_origin_target_is_rejected() {
        let f = fetcher();
        let target = FetchTarget::new(
            "https://attacker.example/event/1/x",
            PageType::EventListing,
            RenderMode::Http,
        );
        let err = f.fetch(&target).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Network);
        assert_eq!(err.attempts, 0);
    }

    #[tokio::test]
    async fn malformed_target_is_rejected() {
        let f = fetcher();
        let target = FetchTarget::new("::://bad", PageType::EventListing, RenderMode::Http);
        let err = f.fetch(&target).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Network);
    }

    #[test]
    fn match_detail_waits_for_header() {
        let f = fetcher();
        match f.readiness_for(PageType::MatchDetail) {
            Readiness::Selector(css) => assert_eq!(css, ".match-header"),
            other => panic!("unexpected readiness: {:?}", other),
        }
    }
}
