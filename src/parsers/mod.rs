//! Page-type dispatched HTML extraction.
//!
//! Each page type has its own ruleset of structural selectors with fallback
//! alternates, since the upstream mixes several listing styles. Parsers are
//! tolerant: a missing optional field becomes `None` in the partial record,
//! and only an absent *required anchor* (no match cards on a listing page at
//! all) raises [`ParseError::StructureMismatch`]. Values are emitted as
//! found; interpretation belongs to the normalizer.

pub mod event_info;
pub mod event_listing;
pub mod match_detail;

use crate::error::ParseError;
use crate::models::{PageType, PartialRecord, RawPage};
use regex::Regex;
use scraper::ElementRef;

/// Extract zero or more partial records from a fetched page.
pub fn parse(page: &RawPage) -> Result<Vec<PartialRecord>, ParseError> {
    match page.page_type {
        PageType::EventInfo => event_info::parse(page),
        PageType::EventListing => event_listing::parse(page),
        PageType::MatchDetail => match_detail::parse(page),
    }
}

/// Element text with whitespace collapsed to single spaces.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The site's native numeric id as it appears in page URLs
/// (`/371266/kru-vs-cloud9-...`, `/event/2095/...`).
pub(crate) fn native_id_from_url(url: &str) -> Option<String> {
    let re = Regex::new(r"/(?:event/)?(\d+)(?:/|$|\?)").unwrap();
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Resolve a possibly relative href against the page URL's origin.
pub(crate) fn absolutize(page_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match reqwest::Url::parse(page_url).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}
