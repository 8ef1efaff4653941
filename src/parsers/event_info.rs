use super::{native_id_from_url, text_of};
use crate::error::ParseError;
use crate::models::{fields, PageType, PartialRecord, RawPage};
use scraper::{Html, Selector};

/// Extract the event overview record from an event page.
///
/// The `h1.wf-title` heading is the required anchor. Description items are
/// label/value pairs whose labels vary in casing and wording, so they are
/// matched by substring.
pub fn parse(page: &RawPage) -> Result<Vec<PartialRecord>, ParseError> {
    let document = Html::parse_document(&page.html);

    let title_sel = Selector::parse("h1.wf-title").unwrap();
    let title = document
        .select(&title_sel)
        .next()
        .ok_or_else(|| ParseError::StructureMismatch {
            url: page.url.clone(),
            detail: "no h1.wf-title heading".to_string(),
        })?;

    let subtitle_sel = Selector::parse("h2.event-desc-subtitle").unwrap();
    let item_sel = Selector::parse("div.event-desc-item").unwrap();
    let label_sel = Selector::parse("div.event-desc-item-label").unwrap();
    let value_sel = Selector::parse("div.event-desc-item-value").unwrap();

    let mut rec = PartialRecord::new(PageType::EventInfo, &page.url);
    rec.native_id = native_id_from_url(&page.url);
    rec.set(fields::NAME, Some(text_of(title)));
    rec.set(
        fields::SUBTITLE,
        document.select(&subtitle_sel).next().map(text_of),
    );

    for item in document.select(&item_sel) {
        let label = match item.select(&label_sel).next() {
            Some(l) => text_of(l).to_lowercase(),
            None => continue,
        };
        let value = match item.select(&value_sel).next() {
            Some(v) => text_of(v),
            None => continue,
        };

        if label.contains("date") {
            rec.set(fields::DATE, Some(value));
        } else if label.contains("location") {
            rec.set(fields::LOCATION, Some(value));
        } else if label.contains("prize") {
            rec.set(fields::PRIZE_POOL, Some(value));
        }
    }

    Ok(vec![rec])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FetchStatus;
    use chrono::Utc;

    fn page(html: &str) -> RawPage {
        RawPage {
            url: "https://www.vlr.gg/event/2095/champions-tour-2024-americas-stage-2".to_string(),
            page_type: PageType::EventInfo,
            html: html.to_string(),
            fetched_at: Utc::now(),
            status: FetchStatus::Http(200),
        }
    }

    #[test]
    fn extracts_overview_fields() {
        let html = r#"
            <h1 class="wf-title">Champions Tour 2024: Americas Stage 2</h1>
            <h2 class="event-desc-subtitle">Regular Season</h2>
            <div class="event-desc-item">
              <div class="event-desc-item-label">Dates</div>
              <div class="event-desc-item-value">Jun 28 - Aug 4</div>
            </div>
            <div class="event-desc-item">
              <div class="event-desc-item-label">Location</div>
              <div class="event-desc-item-value">Los Angeles</div>
            </div>
            <div class="event-desc-item">
              <div class="event-desc-item-label">Prize pool</div>
              <div class="event-desc-item-value">$250,000 USD</div>
            </div>
        "#;
        let records = parse(&page(html)).unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.native_id.as_deref(), Some("2095"));
        assert_eq!(
            rec.get(fields::NAME),
            Some("Champions Tour 2024: Americas Stage 2")
        );
        assert_eq!(rec.get(fields::SUBTITLE), Some("Regular Season"));
        assert_eq!(rec.get(fields::DATE), Some("Jun 28 - Aug 4"));
        assert_eq!(rec.get(fields::LOCATION), Some("Los Angeles"));
        assert_eq!(rec.get(fields::PRIZE_POOL), Some("$250,000 USD"));
    }

    #[test]
    fn missing_title_is_structure_mismatch() {
        let err = parse(&page("<html><body></body></html>")).unwrap_err();
        assert_eq!(err.kind(), "structure_mismatch");
    }
}
