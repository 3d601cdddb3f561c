//! Inline chapter lists (`psc:chapters`) embedded in a feed item

use super::{normalize_chapters, parse_timestamp, Chapter};
use crate::error::{ChapterError, Result};
use crate::feed::{find_item_by_guid, psc_chapters_element, XmlElement};
use std::path::Path;
use tracing::{debug, warn};

/// Extract chapters from an inline chapter list element.
///
/// The list is all-or-nothing: one entry without a usable `start` or
/// `title` discards the whole list.
pub fn extract_inline_chapters(chapters_element: &XmlElement) -> Option<Vec<Chapter>> {
    match parse_inline_chapters(chapters_element) {
        Ok(chapters) if chapters.is_empty() => None,
        Ok(chapters) => Some(chapters),
        Err(e) => {
            warn!("⚠️ Skipping inline chapters: {}", e);
            None
        }
    }
}

/// Extract inline chapters for the item with `guid` from an archived feed file
pub fn extract_inline_chapters_from_file(feed_file: &Path, guid: &str) -> Option<Vec<Chapter>> {
    let root = match XmlElement::parse_file(feed_file) {
        Ok(root) => root,
        Err(e) => {
            warn!("⚠️ Cannot read feed archive {}: {}", feed_file.display(), e);
            return None;
        }
    };
    extract_inline_chapters_for_guid(&root, guid)
}

/// Same as [`extract_inline_chapters_from_file`] on an already parsed feed
pub fn extract_inline_chapters_for_guid(root: &XmlElement, guid: &str) -> Option<Vec<Chapter>> {
    let Some(item) = find_item_by_guid(root, guid) else {
        debug!("No feed item with guid {}", guid);
        return None;
    };
    psc_chapters_element(item).and_then(extract_inline_chapters)
}

fn parse_inline_chapters(chapters_element: &XmlElement) -> Result<Vec<Chapter>> {
    let chapters = chapters_element
        .children()
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let start = entry
                .attr("start")
                .ok_or_else(|| missing_attribute(i, "start"))?;
            let title = entry
                .attr("title")
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| missing_attribute(i, "title"))?;

            Ok(Chapter::new(parse_timestamp(start)?, title))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(normalize_chapters(chapters))
}

fn missing_attribute(index: usize, name: &str) -> ChapterError {
    ChapterError::Extraction(format!("chapter {} has no {}", index + 1, name))
}
