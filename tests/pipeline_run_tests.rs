/// End-to-end pipeline tests against a local listener serving fixture
/// markup. Match detail pages are never fetched (cards carry no links, or
/// the run is cancelled first), so runs need no browser.
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use vlr_scraper::config::RunConfig;
use vlr_scraper::error::PipelineError;
use vlr_scraper::models::{NormalizedDate, RecordStatus, RecordType, TargetState};
use vlr_scraper::pipeline::Pipeline;

const EVENT_HTML: &str = r#"
<html><body>
  <h1 class="wf-title">Valorant Champions 2024</h1>
  <div class="event-desc-item">
    <div class="event-desc-item-label">Dates</div>
    <div class="event-desc-item-value">August 1, 2024</div>
  </div>
  <div class="event-desc-item">
    <div class="event-desc-item-label">Prize pool</div>
    <div class="event-desc-item-value">$2,250,000</div>
  </div>
</body></html>
"#;

const LISTING_HTML: &str = r#"
<html><body>
  <div class="vm-date">
    <div class="vm-date-label">Thu, August 1, 2024</div>
    <a class="vm-match">
      <div class="vm-t"><div class="vm-t-name">Sentinels</div></div>
      <div class="vm-t"><div class="vm-t-name">Fnatic</div></div>
      <div class="vm-score">2:1</div>
      <div class="vm-time">1:00 PM</div>
      <div class="vm-status">completed</div>
    </a>
  </div>
  <div class="vm-date">
    <a class="vm-match">
      <div class="vm-t"><div class="vm-t-name">Cloud9</div></div>
      <div class="vm-t"><div class="vm-t-name">KRU Esports</div></div>
      <div class="vm-time">TBD</div>
      <div class="vm-status">upcoming</div>
    </a>
  </div>
</body></html>
"#;

const LISTING_WITH_LINK_HTML: &str = r#"
<html><body>
  <div class="vm-date">
    <div class="vm-date-label">Thu, August 1, 2024</div>
    <a class="vm-match" href="/371266/sentinels-vs-fnatic">
      <div class="vm-t"><div class="vm-t-name">Sentinels</div></div>
      <div class="vm-t"><div class="vm-t-name">Fnatic</div></div>
      <div class="vm-score">2:1</div>
      <div class="vm-status">completed</div>
    </a>
  </div>
</body></html>
"#;

/// Serve requests with the body chosen by `route(path)`. When `cancel` is
/// given, the token is cancelled as a matches-listing request is answered.
async fn spawn_server<F>(route: F, cancel: Option<CancellationToken>) -> String
where
    F: Fn(&str) -> &'static str + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = [0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let path = request
                .split_whitespace()
                .nth(1)
                .unwrap_or("/")
                .to_string();

            if path.starts_with("/event/matches/") {
                if let Some(token) = &cancel {
                    token.cancel();
                }
            }

            let body = route(&path);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    format!("http://{}", addr)
}

fn event_site(path: &str) -> &'static str {
    if path.starts_with("/event/matches/") {
        LISTING_HTML
    } else {
        EVENT_HTML
    }
}

fn test_run_config() -> RunConfig {
    RunConfig {
        retry_limit: 1,
        min_request_interval_ms: 0,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 2,
        request_timeout_secs: 5,
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn run_merges_listing_and_overview_into_records() {
    let base = spawn_server(event_site, None).await;
    let pipeline = Pipeline::new(&base, &test_run_config()).unwrap();
    let targets = pipeline.entry_targets("/event/2095/champions-tour");

    let outcome = pipeline
        .run(targets, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.report.total_fetched, 2);
    assert_eq!(outcome.report.total_parsed, 3);
    assert!(outcome.report.errors.is_empty());

    let event = outcome
        .records
        .iter()
        .find(|r| r.record_type == RecordType::Event)
        .unwrap();
    assert_eq!(event.id, "event-2095");
    assert_eq!(event.name, "Valorant Champions 2024");
    assert!(event.date.is_known());
    assert_eq!(
        event.extras.get("prize_pool").map(String::as_str),
        Some("$2,250,000")
    );

    let dated = outcome
        .records
        .iter()
        .find(|r| r.name == "Sentinels vs. Fnatic")
        .unwrap();
    assert!(dated.date.is_known());
    assert_eq!(dated.status, RecordStatus::Completed);
    assert_eq!(dated.scores, Some((2, 1)));
    assert!(!dated.incomplete);

    // The undated card still comes through, flagged instead of dropped.
    let undated = outcome
        .records
        .iter()
        .find(|r| r.name == "Cloud9 vs. KRU Esports")
        .unwrap();
    assert!(matches!(undated.date, NormalizedDate::Unknown { .. }));
    assert!(undated.incomplete);
    assert_eq!(outcome.report.incomplete_count, 1);
}

#[tokio::test]
async fn unrecognized_markup_degrades_to_reported_errors() {
    let base = spawn_server(|_| "<html><body><p>maintenance</p></body></html>", None).await;
    let pipeline = Pipeline::new(&base, &test_run_config()).unwrap();
    let targets = pipeline.entry_targets("/event/2095/champions-tour");
    let listing_url = targets[1].url.clone();

    let outcome = pipeline
        .run(targets, CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.report.total_fetched, 2);
    assert_eq!(outcome.report.errors.len(), 2);
    assert!(outcome
        .report
        .errors
        .iter()
        .all(|e| e.kind == "structure_mismatch"));
    assert_eq!(
        outcome.report.targets.get(&listing_url),
        Some(&TargetState::ParseFailed)
    );
}

#[tokio::test]
async fn all_fetches_failing_is_a_run_error() {
    // Bind then drop, so the port is very likely unoccupied.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let pipeline = Pipeline::new(&base, &test_run_config()).unwrap();
    let targets = pipeline.entry_targets("/event/2095/champions-tour");

    let err = pipeline
        .run(targets, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoDataExtracted { attempted: 2 }));
}

#[tokio::test]
async fn cancelled_run_emits_nothing_new_but_still_returns() {
    let base = spawn_server(event_site, None).await;
    let pipeline = Pipeline::new(&base, &test_run_config()).unwrap();
    let targets = pipeline.entry_targets("/event/2095/champions-tour");
    let url = targets[0].url.clone();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = pipeline.run(targets, cancel).await.unwrap();
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.report.total_fetched, 0);
    assert_eq!(
        outcome.report.targets.get(&url),
        Some(&TargetState::Cancelled)
    );
}

#[tokio::test]
async fn cancel_after_first_wave_keeps_its_records_and_skips_details() {
    let cancel = CancellationToken::new();
    let base = spawn_server(
        |path| {
            if path.starts_with("/event/matches/") {
                LISTING_WITH_LINK_HTML
            } else {
                EVENT_HTML
            }
        },
        Some(cancel.clone()),
    )
    .await;
    let pipeline = Pipeline::new(&base, &test_run_config()).unwrap();
    let targets = pipeline.entry_targets("/event/2095/champions-tour");
    let detail_url = format!("{}/371266/sentinels-vs-fnatic", base);

    let outcome = pipeline.run(targets, cancel).await.unwrap();

    // Everything fetched before the cancel is merged and emitted.
    assert_eq!(outcome.report.total_fetched, 2);
    assert!(outcome
        .records
        .iter()
        .any(|r| r.name == "Sentinels vs. Fnatic"));
    assert!(outcome
        .records
        .iter()
        .any(|r| r.record_type == RecordType::Event));

    // The discovered detail page was never fetched.
    assert_eq!(
        outcome.report.targets.get(&detail_url),
        Some(&TargetState::Cancelled)
    );
    assert!(outcome.report.errors.is_empty());
}
