//! Presentation of a finished run: an aligned text table for humans, or a
//! JSON sequence for downstream tooling.

use crate::config::OutputFormat;
use crate::models::{CanonicalRecord, NormalizedDate, RecordStatus, RunReport};

pub fn render(records: &[CanonicalRecord], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => render_table(records),
        OutputFormat::Sequence => render_sequence(records),
    }
}

/// One JSON object per line, full record fidelity. Serialization of a
/// record cannot fail; every field is a plain value.
fn render_sequence(records: &[CanonicalRecord]) -> String {
    let mut out = String::new();
    for record in records {
        match serde_json::to_string(record) {
            Ok(line) => {
                out.push_str(&line);
                out.push('\n');
            }
            Err(e) => log::error!("failed to serialize record {}: {}", record.id, e),
        }
    }
    out
}

fn render_table(records: &[CanonicalRecord]) -> String {
    let headers = ["ID", "NAME", "DATE (UTC)", "STATUS", "SCORE", ""];
    let mut rows: Vec<[String; 6]> = Vec::with_capacity(records.len());

    for record in records {
        let date = match &record.date {
            NormalizedDate::Known(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            NormalizedDate::Unknown { raw: Some(raw) } => format!("? ({})", raw),
            NormalizedDate::Unknown { raw: None } => "?".to_string(),
        };
        let status = match record.status {
            RecordStatus::Upcoming => "upcoming",
            RecordStatus::Live => "LIVE",
            RecordStatus::Completed => "completed",
            RecordStatus::Unknown => "?",
        };
        let score = match record.scores {
            Some((a, b)) => format!("{}-{}", a, b),
            None => String::new(),
        };
        let flag = if record.incomplete { "!" } else { "" };
        rows.push([
            record.id.clone(),
            record.name.clone(),
            date,
            status.to_string(),
            score,
            flag.to_string(),
        ]);
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &headers.map(String::from), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 6], widths: &[usize]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        out.push_str(cell);
        // Last column carries the incomplete marker; no trailing padding.
        if i + 1 < cells.len() {
            for _ in cell.chars().count()..widths[i] {
                out.push(' ');
            }
        }
    }
    // Trim trailing spaces from rows with an empty final column.
    while out.ends_with(' ') {
        out.pop();
    }
    out.push('\n');
}

/// Human-readable run summary printed after the records.
pub fn render_summary(report: &RunReport) -> String {
    let mut out = format!(
        "fetched {} page(s), parsed {} record fragment(s), {} incomplete record(s)",
        report.total_fetched, report.total_parsed, report.incomplete_count
    );
    if !report.errors.is_empty() {
        out.push_str(&format!(", {} error(s):", report.errors.len()));
        for error in &report.errors {
            out.push_str(&format!("\n  [{}] {}: {}", error.kind, error.url, error.message));
        }
    }
    out.push('\n');
    out
}
