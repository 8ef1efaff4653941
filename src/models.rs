use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Known page shapes on the upstream site. Each type has its own extraction
/// ruleset and its own authority when merged records disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    /// Event overview page (title, dates, location, prize pool).
    EventInfo,
    /// Event matches page enumerating match cards.
    EventListing,
    /// Single match page. Client-rendered; richer and authoritative.
    MatchDetail,
}

impl PageType {
    /// Merge authority. Detail pages outrank listing cards, which outrank
    /// the event overview blurb.
    pub fn precedence(&self) -> u8 {
        match self {
            PageType::EventInfo => 0,
            PageType::EventListing => 1,
            PageType::MatchDetail => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::EventInfo => "event_info",
            PageType::EventListing => "event_listing",
            PageType::MatchDetail => "match_detail",
        }
    }
}

/// How a page is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Plain HTTP request; good enough for server-rendered pages.
    Http,
    /// Headless Chrome render; required where content arrives via JS.
    Browser,
}

/// One page the orchestrator wants retrieved. Immutable once issued; the
/// render mode is fixed per page type, never inferred from the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTarget {
    pub url: String,
    pub page_type: PageType,
    pub render_mode: RenderMode,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>, page_type: PageType, render_mode: RenderMode) -> Self {
        Self {
            url: url.into(),
            page_type,
            render_mode,
        }
    }
}

/// How the HTML of a [`RawPage`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Direct HTTP response with this status code.
    Http(u16),
    /// Extracted from a rendered browser tab.
    Rendered,
}

/// Raw HTML for one fetched page. Lives only until it is parsed.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub page_type: PageType,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
    pub status: FetchStatus,
}

/// Field names used in [`PartialRecord::fields`]. Parsers emit these keys
/// with raw, unnormalized values; the normalizer owns their interpretation.
pub mod fields {
    pub const NAME: &str = "name";
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
    pub const TEAM1: &str = "team1";
    pub const TEAM2: &str = "team2";
    pub const SCORE: &str = "score";
    pub const SCORE1: &str = "score1";
    pub const SCORE2: &str = "score2";
    pub const STATUS: &str = "status";
    pub const EVENT: &str = "event";
    pub const STAGE: &str = "stage";
    pub const FORMAT: &str = "format";
    pub const PATCH: &str = "patch";
    pub const MAPS: &str = "maps";
    pub const SUBTITLE: &str = "subtitle";
    pub const LOCATION: &str = "location";
    pub const PRIZE_POOL: &str = "prize_pool";
    pub const DETAIL_URL: &str = "detail_url";
    /// JSON-encoded `Vec<MapStats>` from the rendered scoreboard tables.
    pub const PLAYER_STATS: &str = "player_stats";
}

/// Scoreboard for one played map: one row per player across both teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapStats {
    pub map: String,
    pub players: Vec<PlayerStatLine>,
}

/// One player's scoreboard row. Stat cells are kept raw and header-keyed
/// (rating, acs, k, d, a, kast, adr, hs%, fk, fd vary by page vintage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatLine {
    pub player: String,
    /// 1 or 2, by scoreboard table order.
    pub team: u8,
    pub agent: Option<String>,
    pub stats: BTreeMap<String, String>,
}

/// Unnormalized extraction output for one logical record. Values are strings
/// as found in the markup; absent optional fields are `None`, never dropped
/// keys, so the normalizer can tell "missing" from "not extracted".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialRecord {
    /// Site-native numeric identifier when the page exposes one.
    pub native_id: Option<String>,
    pub page_type: PageType,
    pub fields: BTreeMap<String, Option<String>>,
    pub source_url: String,
}

impl PartialRecord {
    pub fn new(page_type: PageType, source_url: &str) -> Self {
        Self {
            native_id: None,
            page_type,
            fields: BTreeMap::new(),
            source_url: source_url.to_string(),
        }
    }

    pub fn set(&mut self, key: &str, value: Option<String>) {
        // Treat whitespace-only text as missing.
        let value = value.and_then(|v| {
            let t = v.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        });
        self.fields.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_deref())
    }
}

/// What kind of thing a canonical record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Event,
    Match,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Event => "event",
            RecordType::Match => "match",
        }
    }
}

/// Lifecycle state of an event or match as reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Upcoming,
    Live,
    Completed,
    Unknown,
}

/// A date/time field after normalization. The raw string is retained on
/// failure so diagnostics never lose what the site actually said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedDate {
    Known(DateTime<Utc>),
    Unknown { raw: Option<String> },
}

impl NormalizedDate {
    pub fn is_known(&self) -> bool {
        matches!(self, NormalizedDate::Known(_))
    }
}

/// Non-fatal field-level normalization problem, attached to the record
/// instead of failing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationWarning {
    pub field: String,
    pub raw: String,
    pub message: String,
}

/// The normalized output unit consumed by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Stable within a run: the site-native id when known, otherwise a
    /// content key derived from (name, date).
    pub id: String,
    pub record_type: RecordType,
    pub name: String,
    pub date: NormalizedDate,
    /// Ordered participants; empty for event records.
    pub participants: Vec<String>,
    pub status: RecordStatus,
    pub scores: Option<(u32, u32)>,
    /// Secondary fields (event name, format, patch, location, ...).
    pub extras: BTreeMap<String, String>,
    /// True when a required field could not be resolved. The record is
    /// still emitted; consumers decide whether to show it.
    pub incomplete: bool,
    pub warnings: Vec<NormalizationWarning>,
    pub last_updated: DateTime<Utc>,
}

/// One run-report error entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunErrorEntry {
    pub url: String,
    pub kind: String,
    pub message: String,
}

/// Terminal state of one fetch target, for the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Parsed,
    Failed,
    ParseFailed,
    Cancelled,
}

/// Per-run aggregate handed to the caller alongside the record set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub total_fetched: usize,
    pub total_parsed: usize,
    pub incomplete_count: usize,
    pub errors: Vec<RunErrorEntry>,
    /// Terminal state per target URL.
    pub targets: BTreeMap<String, TargetState>,
}
