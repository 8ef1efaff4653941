//! Deduplication and merging of records seen across multiple fetches.
//!
//! Records are keyed by the site-native id when available, otherwise by a
//! content key derived from normalized (name, date). Field conflicts are
//! resolved by source precedence (detail page over listing over event
//! overview); at equal precedence the first-seen value wins by default and
//! the discrepancy is recorded in provenance instead of being overwritten
//! silently. The tie-break is total, so the final record set does not
//! depend on fetch completion order.

use crate::models::{
    CanonicalRecord, NormalizedDate, RecordStatus, RecordType,
};
use crate::normalize::NormalizedFields;
use chrono::Utc;
use std::collections::BTreeMap;

/// How equal-precedence conflicting values are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the first-seen value; record the discrepancy.
    #[default]
    FirstSeen,
    /// Take the latest value; record the discrepancy.
    LastSeen,
}

/// A recorded disagreement between two sources of equal authority.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldConflict {
    pub field: String,
    pub kept: String,
    pub rejected: String,
    pub source_url: String,
}

/// Which pages contributed to a record, and where they disagreed.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Provenance {
    pub sources: Vec<String>,
    pub conflicts: Vec<FieldConflict>,
}

/// One canonical record plus its merge bookkeeping.
#[derive(Debug, Clone)]
pub struct MergedRecord {
    pub record: CanonicalRecord,
    pub provenance: Provenance,
    /// Source precedence that set each field, for overwrite decisions.
    field_precedence: BTreeMap<String, u8>,
}

/// Run-scoped merge accumulator. Lives for one extraction run.
#[derive(Debug, Default)]
pub struct MergeState {
    records: BTreeMap<String, MergedRecord>,
    policy: ConflictPolicy,
}

impl MergeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            records: BTreeMap::new(),
            policy,
        }
    }

    /// Stable identity for a normalized record: the native id when the site
    /// provided one, otherwise a readable content key from (name, date).
    pub fn record_id(nf: &NormalizedFields) -> String {
        let prefix = nf.record_type.as_str();
        if let Some(native) = &nf.native_id {
            return format!("{}-{}", prefix, native);
        }

        let name_part = nf
            .name
            .as_deref()
            .map(slug)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unnamed".to_string());
        let date_part = match &nf.date {
            NormalizedDate::Known(dt) => dt.format("%Y%m%dt%H%M").to_string(),
            NormalizedDate::Unknown { .. } => "undated".to_string(),
        };
        format!("{}-{}-{}", prefix, name_part, date_part)
    }

    /// Merge one normalized record into the accumulated state, creating a
    /// new canonical record or enriching an existing one. Returns the
    /// record id it landed under.
    pub fn apply(&mut self, nf: NormalizedFields) -> String {
        let id = Self::record_id(&nf);
        let policy = self.policy;

        let entry = self.records.entry(id.clone()).or_insert_with(|| MergedRecord {
            record: CanonicalRecord {
                id: id.clone(),
                record_type: nf.record_type,
                name: String::new(),
                date: NormalizedDate::Unknown { raw: None },
                participants: Vec::new(),
                status: RecordStatus::Unknown,
                scores: None,
                extras: BTreeMap::new(),
                incomplete: true,
                warnings: Vec::new(),
                last_updated: Utc::now(),
            },
            provenance: Provenance::default(),
            field_precedence: BTreeMap::new(),
        });

        entry.absorb(nf, policy);
        id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn incomplete_count(&self) -> usize {
        self.records
            .values()
            .filter(|m| m.record.incomplete)
            .count()
    }

    pub fn merged(&self) -> impl Iterator<Item = &MergedRecord> {
        self.records.values()
    }

    /// Final record set, ordered by id. The ordering is stable across runs
    /// with identical inputs regardless of fetch completion order.
    pub fn into_records(self) -> Vec<CanonicalRecord> {
        self.records.into_values().map(|m| m.record).collect()
    }
}

impl MergedRecord {
    fn absorb(&mut self, nf: NormalizedFields, policy: ConflictPolicy) {
        let prec = nf.page_type.precedence();
        let source_url = nf.source_url.clone();

        let name_in = nf.name.filter(|n| !n.is_empty());
        let mut name_slot = if self.record.name.is_empty() {
            None
        } else {
            Some(self.record.name.clone())
        };
        self.merge_field("name", &mut name_slot, name_in, prec, policy, &source_url);
        self.record.name = name_slot.unwrap_or_default();

        let date_in = match &nf.date {
            NormalizedDate::Known(_) => Some(nf.date.clone()),
            NormalizedDate::Unknown { .. } => None,
        };
        let mut date_slot = match &self.record.date {
            NormalizedDate::Known(_) => Some(self.record.date.clone()),
            NormalizedDate::Unknown { .. } => None,
        };
        self.merge_field("date", &mut date_slot, date_in, prec, policy, &source_url);
        if let Some(date) = date_slot {
            self.record.date = date;
        } else if let NormalizedDate::Unknown { raw: Some(raw) } = &nf.date {
            // Keep the first raw string seen for diagnostics; a later
            // unparsed value must not make the output order-dependent.
            if matches!(self.record.date, NormalizedDate::Unknown { raw: None }) {
                self.record.date = NormalizedDate::Unknown {
                    raw: Some(raw.clone()),
                };
            }
        }

        let participants_in = if nf.participants.is_empty() {
            None
        } else {
            Some(nf.participants)
        };
        let mut participants_slot = if self.record.participants.is_empty() {
            None
        } else {
            Some(self.record.participants.clone())
        };
        self.merge_field(
            "participants",
            &mut participants_slot,
            participants_in,
            prec,
            policy,
            &source_url,
        );
        self.record.participants = participants_slot.unwrap_or_default();

        let status_in = (nf.status != RecordStatus::Unknown).then_some(nf.status);
        let mut status_slot =
            (self.record.status != RecordStatus::Unknown).then_some(self.record.status);
        self.merge_field("status", &mut status_slot, status_in, prec, policy, &source_url);
        self.record.status = status_slot.unwrap_or(RecordStatus::Unknown);

        let mut scores_slot = self.record.scores;
        self.merge_field("scores", &mut scores_slot, nf.scores, prec, policy, &source_url);
        self.record.scores = scores_slot;

        for (key, value) in nf.extras {
            let field = format!("extras.{}", key);
            let mut slot = self.record.extras.get(&key).cloned();
            self.merge_field(&field, &mut slot, Some(value), prec, policy, &source_url);
            if let Some(v) = slot {
                self.record.extras.insert(key, v);
            }
        }

        for warning in nf.warnings {
            if !self.record.warnings.contains(&warning) {
                self.record.warnings.push(warning);
            }
        }

        if !self.provenance.sources.contains(&source_url) {
            self.provenance.sources.push(source_url);
        }

        self.record.incomplete = !self.is_complete();
        self.record.last_updated = Utc::now();
    }

    fn is_complete(&self) -> bool {
        let has_participants = self.record.record_type == RecordType::Event
            || self.record.participants.len() == 2;
        !self.record.name.is_empty() && self.record.date.is_known() && has_participants
    }

    /// Core field rule: fill nulls from any source; a higher-precedence
    /// source overwrites; equal precedence with differing values applies
    /// the conflict policy and records the discrepancy.
    fn merge_field<T: PartialEq + Clone + std::fmt::Debug>(
        &mut self,
        field: &str,
        slot: &mut Option<T>,
        incoming: Option<T>,
        prec: u8,
        policy: ConflictPolicy,
        source_url: &str,
    ) {
        let incoming = match incoming {
            Some(v) => v,
            None => return,
        };

        match slot {
            None => {
                *slot = Some(incoming);
                self.field_precedence.insert(field.to_string(), prec);
            }
            Some(existing) => {
                let stored_prec = self.field_precedence.get(field).copied().unwrap_or(0);
                if *existing == incoming {
                    if prec > stored_prec {
                        self.field_precedence.insert(field.to_string(), prec);
                    }
                    return;
                }

                if prec > stored_prec {
                    *slot = Some(incoming);
                    self.field_precedence.insert(field.to_string(), prec);
                } else if prec == stored_prec {
                    let (kept, rejected) = match policy {
                        ConflictPolicy::FirstSeen => (existing.clone(), incoming),
                        ConflictPolicy::LastSeen => {
                            let old = existing.clone();
                            *slot = Some(incoming.clone());
                            (incoming, old)
                        }
                    };
                    self.provenance.conflicts.push(FieldConflict {
                        field: field.to_string(),
                        kept: format!("{:?}", kept),
                        rejected: format!("{:?}", rejected),
                        source_url: source_url.to_string(),
                    });
                } else {
                    log::debug!(
                        "{}: lower-precedence value for {} from {} ignored",
                        self.record.id,
                        field,
                        source_url
                    );
                }
            }
        }
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fields, PageType, PartialRecord};
    use crate::normalize::normalize;

    fn listing_fields(score: &str) -> NormalizedFields {
        let mut p = PartialRecord::new(
            PageType::EventListing,
            "https://www.vlr.gg/event/matches/2095/x",
        );
        p.native_id = Some("371266".to_string());
        p.set(fields::TEAM1, Some("KRU Esports".to_string()));
        p.set(fields::TEAM2, Some("Cloud9".to_string()));
        p.set(fields::SCORE, Some(score.to_string()));
        p.set(fields::DATE, Some("2024-08-01 17:00:00".to_string()));
        p.set(fields::STATUS, Some("Completed".to_string()));
        normalize(&p)
    }

    fn detail_fields() -> NormalizedFields {
        let mut p = PartialRecord::new(
            PageType::MatchDetail,
            "https://www.vlr.gg/371266/kru-vs-cloud9/",
        );
        p.native_id = Some("371266".to_string());
        p.set(fields::TEAM1, Some("KRU Esports".to_string()));
        p.set(fields::TEAM2, Some("Cloud9".to_string()));
        p.set(fields::SCORE, Some("2:1".to_string()));
        p.set(fields::DATE, Some("2024-08-01 17:00:00".to_string()));
        p.set(fields::STATUS, Some("final".to_string()));
        p.set(fields::FORMAT, Some("Bo3".to_string()));
        normalize(&p)
    }

    #[test]
    fn native_id_keys_the_record() {
        let nf = listing_fields("2:1");
        assert_eq!(MergeState::record_id(&nf), "match-371266");
    }

    #[test]
    fn content_key_without_native_id() {
        let mut nf = listing_fields("2:1");
        nf.native_id = None;
        let id = MergeState::record_id(&nf);
        assert_eq!(id, "match-kru-esports-vs-cloud9-20240801t1700");
    }

    #[test]
    fn merge_is_idempotent() {
        let mut state = MergeState::new();
        state.apply(listing_fields("2:1"));
        let once: Vec<_> = state.merged().map(|m| m.record.clone()).collect();

        state.apply(listing_fields("2:1"));
        let twice: Vec<_> = state.merged().map(|m| m.record.clone()).collect();

        assert_eq!(state.len(), 1);
        assert_eq!(once[0].scores, twice[0].scores);
        assert_eq!(once[0].name, twice[0].name);
        assert_eq!(once[0].status, twice[0].status);
        assert!(state.merged().next().unwrap().provenance.conflicts.is_empty());
    }

    #[test]
    fn detail_page_outranks_listing() {
        let mut state = MergeState::new();
        state.apply(listing_fields("1:1"));
        let mut detail = detail_fields();
        detail.scores = Some((2, 1));
        state.apply(detail);

        let merged = state.merged().next().unwrap();
        assert_eq!(merged.record.scores, Some((2, 1)));
        assert_eq!(merged.record.extras.get(fields::FORMAT).map(String::as_str), Some("Bo3"));
        assert_eq!(merged.provenance.sources.len(), 2);
    }

    #[test]
    fn listing_does_not_overwrite_detail() {
        let mut state = MergeState::new();
        state.apply(detail_fields());
        state.apply(listing_fields("0:0"));

        let merged = state.merged().next().unwrap();
        assert_eq!(merged.record.scores, Some((2, 1)));
    }

    #[test]
    fn equal_precedence_conflict_keeps_first_and_records_it() {
        let mut state = MergeState::new();
        state.apply(listing_fields("2:1"));
        state.apply(listing_fields("2:0"));

        let merged = state.merged().next().unwrap();
        assert_eq!(merged.record.scores, Some((2, 1)));
        assert_eq!(merged.provenance.conflicts.len(), 1);
        assert_eq!(merged.provenance.conflicts[0].field, "scores");
    }

    #[test]
    fn last_seen_policy_overwrites_and_records() {
        let mut state = MergeState::with_policy(ConflictPolicy::LastSeen);
        state.apply(listing_fields("2:1"));
        state.apply(listing_fields("2:0"));

        let merged = state.merged().next().unwrap();
        assert_eq!(merged.record.scores, Some((2, 0)));
        assert_eq!(merged.provenance.conflicts.len(), 1);
    }

    #[test]
    fn nulls_fill_from_any_source() {
        let mut incomplete = listing_fields("2:1");
        incomplete.scores = None;
        incomplete.status = RecordStatus::Unknown;

        let mut state = MergeState::new();
        state.apply(incomplete);
        assert!(state.merged().next().unwrap().record.scores.is_none());

        state.apply(listing_fields("2:1"));
        let merged = state.merged().next().unwrap();
        assert_eq!(merged.record.scores, Some((2, 1)));
        assert_eq!(merged.record.status, RecordStatus::Completed);
        assert!(merged.provenance.conflicts.is_empty());
    }

    #[test]
    fn merge_order_does_not_change_final_fields() {
        let a = listing_fields("2:1");
        let mut b = detail_fields();
        b.scores = Some((2, 1));

        let mut forward = MergeState::new();
        forward.apply(a.clone());
        forward.apply(b.clone());

        let mut reverse = MergeState::new();
        reverse.apply(b);
        reverse.apply(a);

        let f = forward.into_records();
        let r = reverse.into_records();
        assert_eq!(f[0].scores, r[0].scores);
        assert_eq!(f[0].name, r[0].name);
        assert_eq!(f[0].status, r[0].status);
        assert_eq!(f[0].date, r[0].date);
    }

    #[test]
    fn first_unparsed_date_raw_is_kept() {
        let mut first = listing_fields("2:1");
        first.date = NormalizedDate::Unknown {
            raw: Some("sometime in August".to_string()),
        };
        let mut second = listing_fields("2:1");
        second.date = NormalizedDate::Unknown {
            raw: Some("TBD".to_string()),
        };

        let mut state = MergeState::new();
        state.apply(first);
        state.apply(second);

        let merged = state.merged().next().unwrap();
        assert_eq!(
            merged.record.date,
            NormalizedDate::Unknown {
                raw: Some("sometime in August".to_string())
            }
        );
        // A parsed date from any later source still takes over.
        state.apply(listing_fields("2:1"));
        assert!(state.merged().next().unwrap().record.date.is_known());
    }

    #[test]
    fn incomplete_flag_tracks_required_fields() {
        let mut nf = listing_fields("2:1");
        nf.date = NormalizedDate::Unknown { raw: None };
        let mut state = MergeState::new();
        state.apply(nf);
        assert_eq!(state.incomplete_count(), 1);

        state.apply(listing_fields("2:1"));
        assert_eq!(state.incomplete_count(), 0);
    }
}
