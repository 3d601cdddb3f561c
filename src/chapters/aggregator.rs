//! Chapter aggregation over every source present in a feed item

use super::cache::RemoteChapterCache;
use super::{
    extract_description_chapters, extract_inline_chapters, fetch_remote_chapters, Chapter,
    ChapterSource,
};
use crate::feed::{podcast_chapters_element, psc_chapters_element, XmlElement};
use crate::http::ChapterFetcher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};
use url::Url;

/// Options for a single aggregation
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Fetch remote chapter indexes (network access)
    pub fetch_remote: bool,
    /// Cache for fetched chapter indexes
    pub cache: Option<RemoteChapterCache>,
    /// Sources not to extract, typically ones already stored
    pub skip: BTreeSet<ChapterSource>,
}

impl ExtractOptions {
    pub fn with_remote(mut self, cache: Option<RemoteChapterCache>) -> Self {
        self.fetch_remote = true;
        self.cache = cache;
        self
    }

    pub fn skip_source(mut self, source: ChapterSource) -> Self {
        self.skip.insert(source);
        self
    }
}

/// Fetchable URL of the item's remote chapter index
pub fn remote_chapters_url(item: &XmlElement) -> Option<&str> {
    let url = podcast_chapters_element(item)?.attr("url")?.trim();
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(url),
        _ => {
            debug!("Ignoring non-http chapter index reference: {}", url);
            None
        }
    }
}

/// Sources present in a feed item, regardless of whether they will parse
pub fn detect_sources(item: &XmlElement) -> BTreeSet<ChapterSource> {
    let mut sources = BTreeSet::new();
    if remote_chapters_url(item).is_some() {
        sources.insert(ChapterSource::Pci);
    }
    if psc_chapters_element(item).is_some() {
        sources.insert(ChapterSource::Psc);
    }
    if item.child_text("description").is_some() {
        sources.insert(ChapterSource::Description);
    }
    sources
}

/// Extract chapters from every source present in `item`.
///
/// Absent, skipped and failed sources are left out of the result. No
/// reconciliation happens between sources.
pub async fn extract_chapters(
    item: &XmlElement,
    fetcher: &dyn ChapterFetcher,
    headers: &HashMap<String, String>,
    options: &ExtractOptions,
) -> BTreeMap<ChapterSource, Vec<Chapter>> {
    let mut found = BTreeMap::new();
    let wanted = |source: &ChapterSource| !options.skip.contains(source);

    for source in detect_sources(item).into_iter().filter(wanted) {
        let chapters = match source {
            ChapterSource::Pci if options.fetch_remote => match remote_chapters_url(item) {
                Some(url) => {
                    let cache_path = match &options.cache {
                        Some(cache) => Some(cache.path_for(url, &cache_label(item)).await),
                        None => None,
                    };
                    fetch_remote_chapters(fetcher, url, headers, cache_path.as_deref()).await
                }
                None => None,
            },
            ChapterSource::Psc => psc_chapters_element(item).and_then(extract_inline_chapters),
            ChapterSource::Description => item
                .child_text("description")
                .and_then(extract_description_chapters),
            _ => None,
        };

        if let Some(chapters) = chapters {
            found.insert(source, chapters);
        }
    }

    if !found.is_empty() {
        info!(
            "📚 {}: chapters from {}",
            cache_label(item),
            found.keys().map(|s| s.tag()).collect::<Vec<_>>().join(", ")
        );
    }

    found
}

/// Human-readable label for an item, used in cache file names
pub fn cache_label(item: &XmlElement) -> String {
    item.child_text("title")
        .or_else(|| item.child_text("guid"))
        .unwrap_or("episode")
        .to_string()
}
