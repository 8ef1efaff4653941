use super::{absolutize, native_id_from_url, text_of};
use crate::error::ParseError;
use crate::models::{fields, PageType, PartialRecord, RawPage};
use scraper::{ElementRef, Html, Selector};

/// Extract match cards from an event matches page.
///
/// Primary layout: `div.vm-date` day groups containing `a.vm-match` cards.
/// Fallback layout: flat `a.wf-module-item` cards as used on the sitewide
/// matches pages. Zero cards under both rulesets means the markup changed
/// shape and is reported as a structure mismatch, not an empty result.
pub fn parse(page: &RawPage) -> Result<Vec<PartialRecord>, ParseError> {
    let document = Html::parse_document(&page.html);

    let mut records = parse_vm_layout(&document, page);
    if records.is_empty() {
        records = parse_module_item_layout(&document, page);
    }

    if records.is_empty() {
        return Err(ParseError::StructureMismatch {
            url: page.url.clone(),
            detail: "no match cards found (vm-match or wf-module-item)".to_string(),
        });
    }

    log::debug!("{}: {} match card(s)", page.url, records.len());
    Ok(records)
}

fn parse_vm_layout(document: &Html, page: &RawPage) -> Vec<PartialRecord> {
    let group_sel = Selector::parse("div.vm-date").unwrap();
    let label_sel = Selector::parse("div.vm-date-label").unwrap();
    let card_sel = Selector::parse("a.vm-match").unwrap();

    let mut records = Vec::new();

    for group in document.select(&group_sel) {
        let date_label = group.select(&label_sel).next().map(text_of);

        for card in group.select(&card_sel) {
            records.push(card_record(card, page, date_label.clone()));
        }
    }

    // Some event pages drop the day grouping and emit bare cards.
    if records.is_empty() {
        for card in document.select(&card_sel) {
            records.push(card_record(card, page, None));
        }
    }

    records
}

fn card_record(card: ElementRef<'_>, page: &RawPage, date_label: Option<String>) -> PartialRecord {
    let team_sel = Selector::parse("div.vm-t-name").unwrap();
    let score_sel = Selector::parse("div.vm-score").unwrap();
    let time_sel = Selector::parse("div.vm-time").unwrap();
    let status_sel = Selector::parse("div.vm-status").unwrap();

    let mut rec = PartialRecord::new(PageType::EventListing, &page.url);

    let teams: Vec<String> = card.select(&team_sel).map(|t| text_of(t)).collect();
    rec.set(fields::TEAM1, teams.first().cloned());
    rec.set(fields::TEAM2, teams.get(1).cloned());
    rec.set(fields::SCORE, card.select(&score_sel).next().map(text_of));
    rec.set(fields::TIME, card.select(&time_sel).next().map(text_of));
    rec.set(fields::STATUS, card.select(&status_sel).next().map(text_of));
    rec.set(fields::DATE, date_label);

    if let Some(href) = card.value().attr("href") {
        let detail_url = absolutize(&page.url, href);
        rec.native_id = native_id_from_url(&detail_url);
        rec.set(fields::DETAIL_URL, Some(detail_url));
    }

    rec
}

fn parse_module_item_layout(document: &Html, page: &RawPage) -> Vec<PartialRecord> {
    let card_sel = Selector::parse("a.wf-module-item").unwrap();
    let team_sel = Selector::parse(".match-item-vs-team-name").unwrap();
    let score_sel = Selector::parse(".match-item-vs-team-score").unwrap();
    let time_sel = Selector::parse(".match-item-time").unwrap();
    let status_sel = Selector::parse(".ml-status").unwrap();
    let event_sel = Selector::parse(".match-item-event").unwrap();

    let mut records = Vec::new();

    for card in document.select(&card_sel) {
        let mut rec = PartialRecord::new(PageType::EventListing, &page.url);

        let teams: Vec<String> = card.select(&team_sel).map(|t| text_of(t)).collect();
        rec.set(fields::TEAM1, teams.first().cloned());
        rec.set(fields::TEAM2, teams.get(1).cloned());

        let scores: Vec<String> = card.select(&score_sel).map(|s| text_of(s)).collect();
        rec.set(fields::SCORE1, scores.first().cloned());
        rec.set(fields::SCORE2, scores.get(1).cloned());

        rec.set(fields::TIME, card.select(&time_sel).next().map(text_of));
        rec.set(fields::STATUS, card.select(&status_sel).next().map(text_of));
        rec.set(fields::EVENT, card.select(&event_sel).next().map(text_of));
        rec.set(fields::DATE, None);

        if let Some(href) = card.value().attr("href") {
            let detail_url = absolutize(&page.url, href);
            rec.native_id = native_id_from_url(&detail_url);
            rec.set(fields::DETAIL_URL, Some(detail_url));
        }

        records.push(rec);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchStatus, PageType};
    use chrono::Utc;

    fn page(html: &str) -> RawPage {
        RawPage {
            url: "https://www.vlr.gg/event/matches/2095/champions-tour".to_string(),
            page_type: PageType::EventListing,
            html: html.to_string(),
            fetched_at: Utc::now(),
            status: FetchStatus::Http(200),
        }
    }

    #[test]
    fn vm_layout_extracts_cards_with_date_group() {
        let html = r#"
            <div class="vm-date">
              <div class="vm-date-label">Thu, August 1, 2024</div>
              <a class="vm-match" href="/371266/kru-vs-cloud9-stage-2-ko/">
                <div class="vm-t"><div class="vm-t-name">KRU Esports</div></div>
                <div class="vm-t"><div class="vm-t-name">Cloud9</div></div>
                <div class="vm-score">2:1</div>
                <div class="vm-time">1:00 PM</div>
                <div class="vm-status">completed</div>
              </a>
            </div>
        "#;
        let records = parse(&page(html)).unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.native_id.as_deref(), Some("371266"));
        assert_eq!(rec.get(fields::TEAM1), Some("KRU Esports"));
        assert_eq!(rec.get(fields::TEAM2), Some("Cloud9"));
        assert_eq!(rec.get(fields::SCORE), Some("2:1"));
        assert_eq!(rec.get(fields::DATE), Some("Thu, August 1, 2024"));
        assert_eq!(
            rec.get(fields::DETAIL_URL),
            Some("https://www.vlr.gg/371266/kru-vs-cloud9-stage-2-ko/")
        );
    }

    #[test]
    fn module_item_fallback_layout() {
        let html = r#"
            <a class="wf-module-item match-item" href="/378660/fnatic-vs-kru-decider">
              <div class="match-item-time">4:00 PM</div>
              <div class="match-item-vs-team-name">FNATIC</div>
              <div class="match-item-vs-team-score">0</div>
              <div class="match-item-vs-team-name">KRU Esports</div>
              <div class="match-item-vs-team-score">2</div>
              <div class="ml-status">Completed</div>
              <div class="match-item-event">Valorant Champions 2024</div>
            </a>
        "#;
        let records = parse(&page(html)).unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.get(fields::TEAM1), Some("FNATIC"));
        assert_eq!(rec.get(fields::SCORE1), Some("0"));
        assert_eq!(rec.get(fields::SCORE2), Some("2"));
        assert_eq!(rec.get(fields::EVENT), Some("Valorant Champions 2024"));
    }

    #[test]
    fn zero_anchors_is_a_structure_mismatch() {
        let html = "<html><body><div class='wf-card'>nothing here</div></body></html>";
        let err = parse(&page(html)).unwrap_err();
        assert_eq!(err.kind(), "structure_mismatch");
    }

    #[test]
    fn missing_optional_fields_stay_none() {
        let html = r#"
            <a class="vm-match" href="/400000/tbd-vs-tbd">
              <div class="vm-t"><div class="vm-t-name">Sentinels</div></div>
            </a>
        "#;
        let records = parse(&page(html)).unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.get(fields::TEAM1), Some("Sentinels"));
        assert_eq!(rec.get(fields::TEAM2), None);
        assert_eq!(rec.get(fields::SCORE), None);
        assert_eq!(rec.get(fields::STATUS), None);
    }
}
