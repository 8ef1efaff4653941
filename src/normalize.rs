//! Field-by-field normalization of raw parser output.
//!
//! Rules are deliberately forgiving: a field that fails to normalize turns
//! into a null plus a warning on the record, never a hard failure, so one
//! bad cell cannot sink an otherwise valid record.

use crate::models::{
    fields, NormalizationWarning, NormalizedDate, PageType, PartialRecord, RecordStatus,
    RecordType,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// Datetime formats seen upstream, most specific first. `data-utc-ts`
/// attributes use the first; the rest cover text renderings.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Date-only formats; a time component is combined in when the page
/// provides one, otherwise midnight UTC.
const DATE_FORMATS: &[&str] = &[
    "%a, %B %d, %Y",
    "%A, %B %d, %Y",
    "%B %d, %Y",
    "%Y-%m-%d",
];

const TIME_FORMATS: &[&str] = &["%I:%M %p", "%H:%M"];

/// Secondary fields copied verbatim into [`CanonicalRecord::extras`]
/// when present.
///
/// [`CanonicalRecord::extras`]: crate::models::CanonicalRecord
const EXTRA_FIELDS: &[&str] = &[
    fields::EVENT,
    fields::STAGE,
    fields::FORMAT,
    fields::PATCH,
    fields::MAPS,
    fields::SUBTITLE,
    fields::LOCATION,
    fields::PRIZE_POOL,
    fields::PLAYER_STATS,
];

/// A [`PartialRecord`] after normalization, ready for merging.
#[derive(Debug, Clone)]
pub struct NormalizedFields {
    pub native_id: Option<String>,
    pub record_type: RecordType,
    pub page_type: PageType,
    pub source_url: String,
    pub name: Option<String>,
    pub date: NormalizedDate,
    pub participants: Vec<String>,
    pub status: RecordStatus,
    pub scores: Option<(u32, u32)>,
    pub extras: BTreeMap<String, String>,
    pub warnings: Vec<NormalizationWarning>,
}

impl NormalizedFields {
    /// Whether every required field resolved. Records failing this are
    /// emitted with `incomplete = true`, never dropped.
    pub fn is_complete(&self) -> bool {
        let has_identity = self.name.is_some();
        let has_participants =
            self.record_type == RecordType::Event || self.participants.len() == 2;
        has_identity && self.date.is_known() && has_participants
    }
}

/// Normalize one partial record. Infallible by design; problems become
/// warnings and nulls.
pub fn normalize(partial: &PartialRecord) -> NormalizedFields {
    let record_type = match partial.page_type {
        PageType::EventInfo => RecordType::Event,
        PageType::EventListing | PageType::MatchDetail => RecordType::Match,
    };

    let mut warnings = Vec::new();

    let participants: Vec<String> = [partial.get(fields::TEAM1), partial.get(fields::TEAM2)]
        .into_iter()
        .flatten()
        .map(clean_name)
        .collect();

    let name = match partial.get(fields::NAME) {
        Some(n) => Some(clean_name(n)),
        None if participants.len() == 2 => {
            Some(format!("{} vs. {}", participants[0], participants[1]))
        }
        None => None,
    };

    let date = normalize_date(
        partial.get(fields::DATE),
        partial.get(fields::TIME),
        &mut warnings,
    );

    let status = normalize_status(partial.get(fields::STATUS), &mut warnings);
    let scores = normalize_scores(partial, &mut warnings);

    let mut extras = BTreeMap::new();
    for key in EXTRA_FIELDS {
        if let Some(value) = partial.get(key) {
            extras.insert(key.to_string(), value.to_string());
        }
    }

    NormalizedFields {
        native_id: partial.native_id.clone(),
        record_type,
        page_type: partial.page_type,
        source_url: partial.source_url.clone(),
        name,
        date,
        participants,
        status,
        scores,
        extras,
        warnings,
    }
}

/// Trim and collapse internal whitespace. Names are never truncated.
fn clean_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_date(
    date_raw: Option<&str>,
    time_raw: Option<&str>,
    warnings: &mut Vec<NormalizationWarning>,
) -> NormalizedDate {
    let raw = match date_raw {
        Some(d) => d,
        None => return NormalizedDate::Unknown { raw: None },
    };

    // Epoch seconds, as some timestamp attributes carry them.
    if let Ok(epoch) = raw.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(epoch, 0) {
            return NormalizedDate::Known(dt);
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return NormalizedDate::Known(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return NormalizedDate::Known(dt.with_timezone(&Utc));
    }

    for fmt in DATE_FORMATS {
        if let Ok(day) = NaiveDate::parse_from_str(raw, fmt) {
            let time = time_raw
                .and_then(|t| {
                    TIME_FORMATS
                        .iter()
                        .find_map(|tf| NaiveTime::parse_from_str(t, tf).ok())
                })
                .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
            return NormalizedDate::Known(Utc.from_utc_datetime(&day.and_time(time)));
        }
    }

    warnings.push(NormalizationWarning {
        field: fields::DATE.to_string(),
        raw: raw.to_string(),
        message: "unrecognized date format".to_string(),
    });
    NormalizedDate::Unknown {
        raw: Some(raw.to_string()),
    }
}

fn normalize_status(
    raw: Option<&str>,
    warnings: &mut Vec<NormalizationWarning>,
) -> RecordStatus {
    let raw = match raw {
        Some(s) => s,
        None => return RecordStatus::Unknown,
    };
    let lowered = raw.to_lowercase();
    if lowered.contains("live") {
        RecordStatus::Live
    } else if lowered.contains("upcoming") || lowered.contains("tbd") {
        RecordStatus::Upcoming
    } else if lowered.contains("final") || lowered.contains("completed") {
        RecordStatus::Completed
    } else {
        warnings.push(NormalizationWarning {
            field: fields::STATUS.to_string(),
            raw: raw.to_string(),
            message: "unrecognized status".to_string(),
        });
        RecordStatus::Unknown
    }
}

/// Scores arrive either as one joint string ("2:1") or as two per-team
/// cells. Values must be non-negative integers; anything else becomes null
/// with a warning.
fn normalize_scores(
    partial: &PartialRecord,
    warnings: &mut Vec<NormalizationWarning>,
) -> Option<(u32, u32)> {
    if let (Some(a), Some(b)) = (partial.get(fields::SCORE1), partial.get(fields::SCORE2)) {
        return parse_score_pair(a, b, warnings);
    }

    let joint = partial.get(fields::SCORE)?;
    let parts: Vec<&str> = joint
        .split(|c| c == ':' || c == '-' || c == '\u{2013}')
        .map(str::trim)
        .collect();
    if parts.len() == 2 {
        parse_score_pair(parts[0], parts[1], warnings)
    } else {
        warnings.push(NormalizationWarning {
            field: fields::SCORE.to_string(),
            raw: joint.to_string(),
            message: "unrecognized score format".to_string(),
        });
        None
    }
}

fn parse_score_pair(
    a: &str,
    b: &str,
    warnings: &mut Vec<NormalizationWarning>,
) -> Option<(u32, u32)> {
    match (a.parse::<u32>(), b.parse::<u32>()) {
        (Ok(x), Ok(y)) => Some((x, y)),
        _ => {
            warnings.push(NormalizationWarning {
                field: fields::SCORE.to_string(),
                raw: format!("{} / {}", a, b),
                message: "scores must be non-negative integers".to_string(),
            });
            None
        }
    }
}
