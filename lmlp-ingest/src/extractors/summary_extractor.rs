//! Summary table extraction
//!
//! Parses an LLM-generated markdown summary into an ordered list of
//! [`Mention`]s. The summaries come from an upstream generator this crate
//! does not control, so the parser tolerates rather than validates:
//!
//! - section headings re-tag the rows that follow them
//! - rows are split column-count-aware (the expected count comes from the
//!   section's header row), so a delimiter embedded in a title does not
//!   fragment the row: surplus cells are re-joined into the title, which is
//!   never the last column
//! - the note cell may wrap its value in decorative markup; the first
//!   numeric token inside is used
//! - header rows, separator rows and rows without usable content are
//!   discarded, never emitted
//!
//! A malformed or unparseable summary yields an empty list, never an error.

use crate::types::{Mention, Section};
use lmlp_common::normalize;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

/// Default column layout: author | title | publisher | critic | note | comment
const DEFAULT_COLUMNS: usize = 6;

static RE_NOTE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());
static RE_HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());

/// Extract the ordered mention list from a summary.
///
/// Output order mirrors source row order; `row_index` counts emitted rows.
pub fn extract_mentions(episode_id: Uuid, summary: &str) -> Vec<Mention> {
    let mut mentions = Vec::new();
    let mut section = Section::Programme;
    let mut expected_columns = DEFAULT_COLUMNS;
    let mut row_index: i64 = 0;

    for line in summary.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if !trimmed.starts_with('|') {
            if let Some(new_section) = detect_section(trimmed) {
                debug!(section = new_section.as_str(), "Section heading detected");
                section = new_section;
                // Each section may carry its own header row
                expected_columns = DEFAULT_COLUMNS;
            }
            continue;
        }

        let cells = split_row(trimmed);
        if cells.is_empty() || is_separator_row(&cells) {
            continue;
        }
        if is_header_row(&cells) {
            expected_columns = cells.len().max(2);
            continue;
        }

        let cells = fit_to_columns(cells, expected_columns);

        let author_text = clean_cell(cells.first().map(String::as_str).unwrap_or(""));
        let title_text = clean_cell(cells.get(1).map(String::as_str).unwrap_or(""));
        let publisher_text = clean_cell(cells.get(2).map(String::as_str).unwrap_or(""));
        let critic_text = clean_cell(cells.get(3).map(String::as_str).unwrap_or(""));
        let note = cells.get(4).and_then(|c| parse_note(c));

        if author_text.is_empty() && title_text.is_empty() && critic_text.is_empty() {
            continue;
        }

        mentions.push(Mention {
            episode_id,
            section,
            author_text,
            title_text,
            publisher_text,
            critic_text,
            note,
            row_index,
        });
        row_index += 1;
    }

    debug!(
        episode_id = %episode_id,
        mention_count = mentions.len(),
        "Summary extraction complete"
    );

    mentions
}

/// Detect a section heading on a non-table line.
///
/// Detection is accent- and case-insensitive ("COUPS DE CŒUR" and
/// "coup de coeur" both match).
fn detect_section(line: &str) -> Option<Section> {
    let key = normalize(line);
    if key.contains("coup de coeur") || key.contains("coups de coeur") {
        Some(Section::CoupDeCoeur)
    } else if key.contains("programme") {
        Some(Section::Programme)
    } else {
        None
    }
}

/// Split a table row into raw cells, dropping the leading/trailing pipes
fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    inner.split('|').map(|c| c.trim().to_string()).collect()
}

/// Separator rows contain only dashes, colons and equals signs
fn is_separator_row(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | '=' | ' ')))
        || cells.iter().all(|c| c.is_empty())
}

/// Header rows name the columns instead of carrying data
fn is_header_row(cells: &[String]) -> bool {
    let first = normalize(cells.first().map(String::as_str).unwrap_or(""));
    let second = normalize(cells.get(1).map(String::as_str).unwrap_or(""));
    first.contains("auteur") || second.contains("titre") || second.contains("livre")
}

/// Reshape a cell list to the expected column count.
///
/// Surplus cells come from a delimiter embedded in the title (the only
/// free-text column before the trailing fixed ones), so they are re-joined
/// into the title cell. Missing trailing cells are padded empty.
fn fit_to_columns(mut cells: Vec<String>, expected: usize) -> Vec<String> {
    if cells.len() > expected {
        let surplus = cells.len() - expected;
        let merged: Vec<String> = cells.drain(1..=1 + surplus).collect();
        cells.insert(1, merged.join(", "));
    }
    while cells.len() < expected {
        cells.push(String::new());
    }
    cells
}

/// Strip decoration from a cell and collapse placeholders to empty.
///
/// Removes HTML tags, markdown emphasis and surrounding quotes; `-`, `—` and
/// `n/a` count as "no content".
fn clean_cell(cell: &str) -> String {
    let without_tags = RE_HTML_TAG.replace_all(cell, "");
    let stripped = without_tags
        .trim()
        .trim_matches(|c| matches!(c, '*' | '_' | '`' | '"' | '«' | '»'))
        .trim();

    if !stripped.chars().any(|c| c.is_alphanumeric()) {
        return String::new();
    }

    match normalize(stripped).as_str() {
        "n/a" | "na" | "tbd" => String::new(),
        _ => stripped.to_string(),
    }
}

/// Extract a note value from a cell that may wrap it in decorative markup.
///
/// Tags are stripped before the token scan so digits inside tag attributes
/// (hex colors, pixel sizes) never shadow the score. First numeric token
/// wins; comma decimals are tolerated; values outside [0, 10] are dropped
/// rather than clamped, since they indicate a token that was not a score at
/// all.
fn parse_note(cell: &str) -> Option<f64> {
    let without_tags = RE_HTML_TAG.replace_all(cell, "");
    let token = RE_NOTE_TOKEN.find(&without_tags)?;
    let value: f64 = token.as_str().replace(',', ".").parse().ok()?;
    if (0.0..=10.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}
