//! Chapter markers embedded in free-text episode descriptions
//!
//! Descriptions have no agreed structure. A primary pattern looks for
//! repeated `timestamp title` runs; a single hit is treated as a false
//! positive unless a more permissive retry over that hit splits it into
//! several chapters.

use super::{normalize_chapters, parse_timestamp, Chapter};
use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// `H:MM:SS` or `M:SS`, optionally bracketed and preceded by a tag's `>`.
/// The title runs to the next `[`, `(`, `<`, line break or end of text.
static PRIMARY_CHAPTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r">?\s?[(\[]?([0-9]{0,2}:?[0-9]{1,2}:[0-9]{2})[\])]?[\s-]*([^\[(<\r\n]+)")
        .expect("primary chapter pattern")
});

/// Timestamp prefix of the retry pattern. Its title has no terminator of
/// its own and ends where the next timestamp begins.
static RETRY_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{0,2}:?[0-9]{1,2}:[0-9]{2})[\])]?[\s-]*").expect("retry timestamp pattern")
});

static NEXT_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{1,2}:").expect("next timestamp pattern"));

static EMBEDDED_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s"'<>]+"#).expect("url pattern"));

/// Extract chapters from an episode description.
///
/// Returns `None` when fewer than two titled chapter markers can be found
/// or a marker's timestamp cannot be parsed.
pub fn extract_description_chapters(description: &str) -> Option<Vec<Chapter>> {
    let matches = find_chapter_matches(description)?;

    let chapters = matches
        .iter()
        .map(|(timestamp, title)| chapter_from_description_match(timestamp, title))
        .collect::<Result<Vec<_>>>();

    match chapters {
        Ok(chapters) => {
            // Blank titles are dropped here, so the count is checked again
            let chapters = normalize_chapters(chapters);
            (chapters.len() > 1).then_some(chapters)
        }
        Err(e) => {
            warn!("Skipping description chapters: {}", e);
            None
        }
    }
}

/// Build a chapter from one `(timestamp, raw title)` match.
///
/// An anchor left open by the title boundary gets a closing tag so the
/// title stays a well-formed fragment, and the first absolute link in the
/// title becomes the chapter URL.
pub fn chapter_from_description_match(timestamp: &str, raw_title: &str) -> Result<Chapter> {
    let mut title = raw_title.trim().to_string();
    if title.contains("<a") && !title.contains("</a>") {
        title.push_str("</a>");
    }

    let url = EMBEDDED_URL.find(&title).map(|m| m.as_str().to_string());

    Ok(Chapter::new(parse_timestamp(timestamp)?, title).with_url(url))
}

fn find_chapter_matches(description: &str) -> Option<Vec<(String, String)>> {
    let primary: Vec<(String, String)> = PRIMARY_CHAPTER
        .captures_iter(description)
        .filter_map(|caps| Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string())))
        .collect();

    match primary.len() {
        0 => None,
        1 => {
            let (timestamp, title) = &primary[0];
            let retried = retry_chapter_matches(&format!("{} {}", timestamp, title));
            if retried.len() > 1 {
                debug!("Recovered {} description chapters from a single match", retried.len());
                Some(retried)
            } else {
                debug!("Single description timestamp rejected: {}", timestamp);
                None
            }
        }
        _ => Some(primary),
    }
}

/// Permissive pass: every title must be followed by another timestamp,
/// which is left in place to start the next match.
fn retry_chapter_matches(text: &str) -> Vec<(String, String)> {
    let mut found = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let Some(caps) = RETRY_TIMESTAMP.captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(timestamp)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        match title_end(text, whole.end()) {
            Some(end) => {
                found.push((timestamp.as_str().to_string(), text[whole.end()..end].to_string()));
                pos = end;
            }
            // Patterns only match ASCII here, so +1 stays on a char boundary
            None => pos = whole.start() + 1,
        }
    }

    found
}

/// End of a title starting at `start`: the shortest non-empty run without
/// `[` or `(` that is directly followed by a timestamp.
fn title_end(text: &str, start: usize) -> Option<usize> {
    let first = text[start..].chars().next()?;
    let boundary = NEXT_TIMESTAMP.find_at(text, start + first.len_utf8())?.start();
    if text[start..boundary].contains(['[', '(']) {
        None
    } else {
        Some(boundary)
    }
}
