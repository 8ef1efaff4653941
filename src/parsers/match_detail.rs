use super::{native_id_from_url, text_of};
use crate::error::ParseError;
use crate::models::{fields, MapStats, PageType, PartialRecord, PlayerStatLine, RawPage};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

/// Status words the header notes use; anything else in a note is the
/// series format ("Bo3", "Bo5").
const STATUS_WORDS: &[&str] = &["final", "live", "upcoming", "tbd"];

/// Extract one enrichment record from a rendered match page.
///
/// The `.match-header` block is the required anchor; a page without it is
/// either an error page or a markup change and is reported as such. All
/// header fields beyond the anchor are optional.
pub fn parse(page: &RawPage) -> Result<Vec<PartialRecord>, ParseError> {
    let document = Html::parse_document(&page.html);

    let header_sel = Selector::parse("div.match-header").unwrap();
    let header = document.select(&header_sel).next().ok_or_else(|| {
        ParseError::StructureMismatch {
            url: page.url.clone(),
            detail: "no .match-header block".to_string(),
        }
    })?;

    let team_sel = Selector::parse(".match-header-link-name .wf-title-med").unwrap();
    let score_sel = Selector::parse(".match-header-vs-score").unwrap();
    let date_sel = Selector::parse("div.moment-tz-convert").unwrap();
    let event_sel = Selector::parse("a.match-header-event").unwrap();
    let note_sel = Selector::parse(".match-header-vs-note").unwrap();

    let mut rec = PartialRecord::new(PageType::MatchDetail, &page.url);
    rec.native_id = native_id_from_url(&page.url);

    let teams: Vec<String> = header.select(&team_sel).map(text_of).collect();
    rec.set(fields::TEAM1, teams.first().cloned());
    rec.set(fields::TEAM2, teams.get(1).cloned());

    rec.set(fields::SCORE, header.select(&score_sel).next().map(text_of));
    rec.set(fields::EVENT, header.select(&event_sel).next().map(text_of));

    // The timestamp attribute is authoritative; the element text is a
    // local-time rendering and only a fallback.
    let date = header.select(&date_sel).next().map(|el| {
        el.value()
            .attr("data-utc-ts")
            .map(|ts| ts.to_string())
            .unwrap_or_else(|| text_of(el))
    });
    rec.set(fields::DATE, date);

    // Header notes mix status and format; split them by vocabulary.
    for note in header.select(&note_sel) {
        let text = text_of(note);
        let lowered = text.to_lowercase();
        if STATUS_WORDS.contains(&lowered.as_str()) {
            rec.set(fields::STATUS, Some(text));
        } else if rec.get(fields::FORMAT).is_none() {
            rec.set(fields::FORMAT, Some(text));
        }
    }

    let header_text = text_of(header);
    let patch_re = Regex::new(r"Patch\s*([\d.]+)").unwrap();
    let patch = patch_re
        .captures(&header_text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    rec.set(fields::PATCH, patch);

    let maps = map_stats(&document);
    if maps.is_empty() {
        rec.set(fields::MAPS, map_names(&document));
    } else {
        let names: Vec<&str> = maps.iter().map(|m| m.map.as_str()).collect();
        rec.set(fields::MAPS, Some(names.join(", ")));
        if maps.iter().any(|m| !m.players.is_empty()) {
            match serde_json::to_string(&maps) {
                Ok(json) => rec.set(fields::PLAYER_STATS, Some(json)),
                Err(e) => log::warn!("{}: failed to encode scoreboard: {}", page.url, e),
            }
        }
    }

    Ok(vec![rec])
}

/// Per-map scoreboards from the `.vm-stats-game` containers. The `all`
/// container aggregates across maps and is skipped; the first two tables in
/// each remaining container are the team 1 and team 2 scoreboards.
fn map_stats(document: &Html) -> Vec<MapStats> {
    let container_sel = Selector::parse("div.vm-stats-game").unwrap();
    let map_sel = Selector::parse(".vm-stats-game-header .map, .map-header .map").unwrap();
    let table_sel = Selector::parse("table").unwrap();

    let mut maps = Vec::new();

    for container in document.select(&container_sel) {
        if container.value().attr("data-game-id") == Some("all") {
            continue;
        }

        let map = match container.select(&map_sel).next() {
            // The header appends pick info ("Ascent PICK"); keep the name.
            Some(el) => match text_of(el).split("PICK").next() {
                Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => continue,
            },
            None => continue,
        };

        let mut players = Vec::new();
        for (i, table) in container.select(&table_sel).take(2).enumerate() {
            players.extend(scoreboard_rows(table, (i + 1) as u8));
        }

        maps.push(MapStats { map, players });
    }

    maps
}

/// Rows of one team's scoreboard table, keyed by the table's own headers.
fn scoreboard_rows(table: ElementRef<'_>, team: u8) -> Vec<PlayerStatLine> {
    let header_sel = Selector::parse("th").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();
    let name_sel = Selector::parse(".text-of").unwrap();
    let agent_sel = Selector::parse("img").unwrap();

    let headers: Vec<String> = table
        .select(&header_sel)
        .map(|h| text_of(h).to_lowercase())
        .collect();

    let mut rows = Vec::new();

    for row in table.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        if cells.is_empty() {
            continue;
        }

        // The name cell nests the handle under .text-of next to a team tag.
        let player = cells[0]
            .select(&name_sel)
            .next()
            .map(text_of)
            .unwrap_or_else(|| text_of(cells[0]));
        if player.is_empty() {
            continue;
        }

        let agent = row.select(&agent_sel).find_map(|img| {
            img.value()
                .attr("title")
                .or_else(|| img.value().attr("alt"))
                .map(str::to_string)
        });

        let mut stats = BTreeMap::new();
        for (i, cell) in cells.iter().enumerate().skip(1) {
            let key = match headers.get(i) {
                Some(h) if !h.is_empty() => h,
                _ => continue,
            };
            let value = text_of(*cell);
            if !value.is_empty() && value != "-" {
                stats.insert(key.clone(), value);
            }
        }

        rows.push(PlayerStatLine {
            player,
            team,
            agent,
            stats,
        });
    }

    rows
}

/// Played map names, from the stats tabs or the picks/bans list.
fn map_names(document: &Html) -> Option<String> {
    let stats_sel = Selector::parse(".vm-stats-game .map-header .map").unwrap();
    let list_sel = Selector::parse(".map-list .map-name").unwrap();

    let mut names: Vec<String> = document.select(&stats_sel).map(text_of).collect();
    if names.is_empty() {
        names = document.select(&list_sel).map(text_of).collect();
    }

    names.retain(|n| !n.is_empty());
    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}
