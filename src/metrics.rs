//! Per-page-type fetch and parse tallies for the run report.

use crate::models::PageType;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PageTypeMetrics {
    pub fetched: u64,
    pub fetch_failures: u64,
    pub parse_errors: u64,
    pub records: u64,
    pub total_fetch_ms: u64,
}

impl PageTypeMetrics {
    pub fn success_rate(&self) -> f64 {
        let total = self.fetched + self.fetch_failures;
        if total == 0 {
            0.0
        } else {
            (self.fetched as f64 / total as f64) * 100.0
        }
    }

    pub fn average_fetch_ms(&self) -> f64 {
        if self.fetched == 0 {
            0.0
        } else {
            self.total_fetch_ms as f64 / self.fetched as f64
        }
    }
}

/// Thread-safe tally shared across worker tasks.
#[derive(Debug, Default)]
pub struct MetricsTracker {
    inner: Mutex<HashMap<PageType, PageTypeMetrics>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F: FnOnce(&mut PageTypeMetrics)>(&self, page_type: PageType, f: F) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(inner.entry(page_type).or_default());
    }

    pub fn record_fetch(&self, page_type: PageType, elapsed: Duration) {
        self.update(page_type, |m| {
            m.fetched += 1;
            m.total_fetch_ms += elapsed.as_millis() as u64;
        });
    }

    pub fn record_fetch_failure(&self, page_type: PageType) {
        self.update(page_type, |m| m.fetch_failures += 1);
    }

    pub fn record_parse_error(&self, page_type: PageType) {
        self.update(page_type, |m| m.parse_errors += 1);
    }

    pub fn record_records(&self, page_type: PageType, count: usize) {
        self.update(page_type, |m| m.records += count as u64);
    }

    /// Snapshot ordered by page type, for logging and the run outcome.
    pub fn snapshot(&self) -> Vec<(PageType, PageTypeMetrics)> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries: Vec<_> = inner.iter().map(|(k, v)| (*k, v.clone())).collect();
        entries.sort_by_key(|(k, _)| *k);
        entries
    }
}
