use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Per-host pacing gate.
///
/// Every request start reserves a slot under the lock, so two concurrent
/// callers hitting the same host can never start closer together than the
/// configured interval, regardless of task scheduling order.
#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration,
    next_start: Mutex<HashMap<String, Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_start: Mutex::new(HashMap::new()),
        }
    }

    /// Extract the host a URL targets; used as the gate key.
    pub fn host_of(url: &str) -> Option<String> {
        reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }

    /// Wait until this caller's reserved start slot for `host` arrives.
    /// Returns immediately when the interval is zero or the host is new.
    pub async fn acquire(&self, host: &str) {
        if self.min_interval.is_zero() {
            return;
        }

        let wait = {
            let mut slots = self.next_start.lock().await;
            let now = Instant::now();
            let start = match slots.get(host) {
                Some(prev) => {
                    let candidate = *prev + self.min_interval;
                    if candidate > now {
                        candidate
                    } else {
                        now
                    }
                }
                None => now,
            };
            slots.insert(host.to_string(), start);
            if start > now {
                start - now
            } else {
                Duration::ZERO
            }
        };

        if !wait.is_zero() {
            log::debug!("rate gate: delaying {}ms for {}", wait.as_millis(), host);
            sleep(wait).await;
        }
    }
}
