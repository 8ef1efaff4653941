//! Run orchestration: listing discovery, bounded concurrent fetch/parse,
//! normalization, and merging.
//!
//! The orchestrator is the only component aware of concurrency and retry
//! policy. Fetch/parse work fans out across worker tasks under two
//! independent caps (HTTP and browser mode); normalization and merging run
//! on the coordinating task, so merges for the same identity are naturally
//! serialized. A single page failing degrades its record and lands in the
//! run report; only a run where every fetch failed returns an error.

use crate::config::{Config, RunConfig};
use crate::error::{FetchError, PipelineError};
use crate::fetcher::{FetchPolicy, Fetcher};
use crate::merge::{MergeState, Provenance};
use crate::metrics::{MetricsTracker, PageTypeMetrics};
use crate::models::{
    fields, CanonicalRecord, FetchTarget, PageType, PartialRecord, RenderMode, RunErrorEntry,
    RunReport, TargetState,
};
use crate::normalize::normalize;
use crate::parsers;
use crate::browser::BrowserConfig;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Everything a run hands to the presentation layer. Consumed read-only.
#[derive(Debug)]
pub struct RunOutcome {
    pub records: Vec<CanonicalRecord>,
    /// Contributing sources and recorded conflicts, per record id.
    pub provenance: BTreeMap<String, Provenance>,
    pub report: RunReport,
    pub metrics: Vec<(PageType, PageTypeMetrics)>,
}

/// One extraction run's driver. Holds the shared fetcher, the two
/// concurrency caps, and the metrics tally.
pub struct Pipeline {
    fetcher: Arc<Fetcher>,
    http_permits: Arc<Semaphore>,
    browser_permits: Arc<Semaphore>,
    render_mode_default: RenderMode,
    base_url: String,
    metrics: Arc<MetricsTracker>,
}

/// Outcome of one target's fetch+parse task.
struct TargetRun {
    url: String,
    state: TargetState,
    partials: Vec<PartialRecord>,
    error: Option<RunErrorEntry>,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(&config.base_url, &config.run)
    }

    pub fn new(base_url: &str, run: &RunConfig) -> Result<Self, FetchError> {
        let policy = FetchPolicy {
            retry_limit: run.retry_limit,
            request_timeout: run.request_timeout(),
            min_request_interval: run.min_request_interval(),
            retry_base_delay_ms: run.retry_base_delay_ms,
            retry_max_delay_ms: run.retry_max_delay_ms,
        };
        let browser_config = BrowserConfig {
            headless: run.browser_headless,
            disable_images: run.browser_disable_images,
            timeout_seconds: run.browser_timeout_secs,
            ..BrowserConfig::default()
        };
        let fetcher = Fetcher::new(base_url, policy, browser_config)?;

        Ok(Self {
            fetcher: Arc::new(fetcher),
            http_permits: Arc::new(Semaphore::new(run.max_concurrency.max(1))),
            browser_permits: Arc::new(Semaphore::new(run.browser_concurrency.max(1))),
            render_mode_default: run.render_mode_default,
            base_url: base_url.trim_end_matches('/').to_string(),
            metrics: Arc::new(MetricsTracker::new()),
        })
    }

    /// Render mode per page type. Match pages build their content in JS and
    /// always go through the browser; everything else follows the
    /// configured default.
    fn mode_for(&self, page_type: PageType) -> RenderMode {
        match page_type {
            PageType::MatchDetail => RenderMode::Browser,
            _ => self.render_mode_default,
        }
    }

    /// Entry-point paths must look like event pages; anything else is a
    /// configuration mistake worth rejecting before the run starts.
    pub fn validate_entry_path(path: &str) -> Result<(), String> {
        let re = Regex::new(r"^/event/(matches/)?\d+(/|$)").unwrap();
        if re.is_match(path) {
            Ok(())
        } else {
            Err(format!(
                "expected /event/{{id}}/... or /event/matches/{{id}}/..., got {}",
                path
            ))
        }
    }

    /// Fetch targets for one event entry path. The overview page and the
    /// matches listing are sibling URLs, so either entry form yields both:
    /// `/event/{id}/...` pairs with `/event/matches/{id}/...` and vice versa.
    pub fn entry_targets(&self, path: &str) -> Vec<FetchTarget> {
        let matches_re = Regex::new(r"^/event/matches/(\d+)(/.*)?$").unwrap();
        let plain_re = Regex::new(r"^/event/(\d+)(/.*)?$").unwrap();

        let listing = |url: String| {
            FetchTarget::new(url, PageType::EventListing, self.mode_for(PageType::EventListing))
        };
        let info = |url: String| {
            FetchTarget::new(url, PageType::EventInfo, self.mode_for(PageType::EventInfo))
        };

        if let Some(caps) = matches_re.captures(path) {
            let id = &caps[1];
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("/");
            vec![
                listing(format!("{}{}", self.base_url, path)),
                info(format!("{}/event/{}{}", self.base_url, id, rest)),
            ]
        } else if let Some(caps) = plain_re.captures(path) {
            let id = &caps[1];
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("/");
            vec![
                info(format!("{}{}", self.base_url, path)),
                listing(format!("{}/event/matches/{}{}", self.base_url, id, rest)),
            ]
        } else {
            vec![listing(format!("{}{}", self.base_url, path))]
        }
    }

    /// Drive one extraction run over the given entry targets.
    ///
    /// Cancellation stops new fetches from being issued; in-flight fetches
    /// finish or time out, and whatever merged by then is still emitted.
    pub async fn run(
        &self,
        entry_targets: Vec<FetchTarget>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        if entry_targets.is_empty() {
            return Err(PipelineError::NoEntryPoints {
                reason: "no entry targets supplied".to_string(),
            });
        }

        let mut state = MergeState::new();
        let mut report = RunReport::default();
        let mut attempted = 0usize;

        // Wave 1: entry pages (listings and event overviews).
        let runs = self.process_wave(entry_targets, &cancel).await;
        let mut detail_urls: Vec<String> = Vec::new();
        let mut seen_details: HashSet<String> = HashSet::new();
        for run in runs {
            attempted += 1;
            for partial in &run.partials {
                if partial.page_type == PageType::EventListing {
                    if let Some(url) = partial.get(fields::DETAIL_URL) {
                        if seen_details.insert(url.to_string()) {
                            detail_urls.push(url.to_string());
                        }
                    }
                }
            }
            absorb_run(run, &mut state, &mut report);
        }

        // Wave 2: discovered match detail pages.
        let detail_targets: Vec<FetchTarget> = detail_urls
            .into_iter()
            .map(|url| {
                FetchTarget::new(url, PageType::MatchDetail, self.mode_for(PageType::MatchDetail))
            })
            .collect();
        if !detail_targets.is_empty() {
            let runs = self.process_wave(detail_targets, &cancel).await;
            for run in runs {
                attempted += 1;
                absorb_run(run, &mut state, &mut report);
            }
        }

        report.incomplete_count = state.incomplete_count();

        if report.total_fetched == 0 && !report.errors.is_empty() {
            return Err(PipelineError::NoDataExtracted { attempted });
        }

        let metrics = self.metrics.snapshot();
        for (page_type, m) in &metrics {
            log::info!(
                "{}: {} fetched, {} failed, {} record(s), avg {:.0}ms",
                page_type.as_str(),
                m.fetched,
                m.fetch_failures,
                m.records,
                m.average_fetch_ms()
            );
        }

        let provenance: BTreeMap<String, Provenance> = state
            .merged()
            .map(|m| (m.record.id.clone(), m.provenance.clone()))
            .collect();

        Ok(RunOutcome {
            records: state.into_records(),
            provenance,
            report,
            metrics,
        })
    }

    /// Fan one wave of targets out across worker tasks, bounded by the
    /// per-mode concurrency caps.
    async fn process_wave(
        &self,
        targets: Vec<FetchTarget>,
        cancel: &CancellationToken,
    ) -> Vec<TargetRun> {
        let mut tasks: JoinSet<TargetRun> = JoinSet::new();

        for target in targets {
            let permits = match target.render_mode {
                RenderMode::Http => Arc::clone(&self.http_permits),
                RenderMode::Browser => Arc::clone(&self.browser_permits),
            };
            let fetcher = Arc::clone(&self.fetcher);
            let metrics = Arc::clone(&self.metrics);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let permit = match permits.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return TargetRun::cancelled(&target.url),
                };
                // Checked after the permit so a cancelled run stops issuing
                // fetches as soon as each slot frees up.
                if cancel.is_cancelled() {
                    return TargetRun::cancelled(&target.url);
                }
                let run = process_target(&fetcher, &metrics, &target).await;
                drop(permit);
                run
            });
        }

        let mut runs = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(run) => runs.push(run),
                Err(e) => log::error!("worker task failed: {}", e),
            }
        }
        runs
    }
}

async fn process_target(
    fetcher: &Fetcher,
    metrics: &MetricsTracker,
    target: &FetchTarget,
) -> TargetRun {
    let started = Instant::now();

    let page = match fetcher.fetch(target).await {
        Ok(page) => page,
        Err(e) => {
            metrics.record_fetch_failure(target.page_type);
            log::warn!("fetch failed: {}", e);
            return TargetRun {
                url: target.url.clone(),
                state: TargetState::Failed,
                partials: Vec::new(),
                error: Some(RunErrorEntry {
                    url: target.url.clone(),
                    kind: e.kind.as_str().to_string(),
                    message: e.to_string(),
                }),
            };
        }
    };
    metrics.record_fetch(target.page_type, started.elapsed());

    match parsers::parse(&page) {
        Ok(partials) => {
            metrics.record_records(target.page_type, partials.len());
            TargetRun {
                url: target.url.clone(),
                state: TargetState::Parsed,
                partials,
                error: None,
            }
        }
        Err(e) => {
            metrics.record_parse_error(target.page_type);
            log::warn!("parse failed, possible upstream markup change: {}", e);
            TargetRun {
                url: target.url.clone(),
                state: TargetState::ParseFailed,
                partials: Vec::new(),
                error: Some(RunErrorEntry {
                    url: target.url.clone(),
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }),
            }
        }
    }
}

/// Fold one target's outcome into the merge state and report. Runs on the
/// coordinating task only.
fn absorb_run(run: TargetRun, state: &mut MergeState, report: &mut RunReport) {
    match run.state {
        TargetState::Parsed | TargetState::ParseFailed => report.total_fetched += 1,
        TargetState::Failed | TargetState::Cancelled => {}
    }

    for partial in run.partials {
        state.apply(normalize(&partial));
        report.total_parsed += 1;
    }

    if let Some(error) = run.error {
        report.errors.push(error);
    }
    report.targets.insert(run.url, run.state);
}

impl TargetRun {
    fn cancelled(url: &str) -> Self {
        Self {
            url: url.to_string(),
            state: TargetState::Cancelled,
            partials: Vec::new(),
            error: None,
        }
    }
}
