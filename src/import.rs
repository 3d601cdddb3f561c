//! Feed import: archive a feed, store its episodes and their chapters

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::backfill::archived_feed_path;
use crate::chapters::{extract_chapters, ChapterRecord, ChapterSource, ExtractOptions, RemoteChapterCache};
use crate::config::Config;
use crate::datastore::Datastore;
use crate::feed::{self, FeedItem, XmlElement};
use crate::http::{ChapterFetcher, RequestHeaders};

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub feed_title: String,
    pub xml_url: String,
    pub archive_path: PathBuf,
    pub episodes: usize,
    /// Items without an enclosure
    pub skipped: usize,
    /// Chapter rows stored per source
    pub chapters: BTreeMap<ChapterSource, usize>,
}

/// Import one feed from an http(s) URL or a local file.
///
/// Chapters are extracted only for sources an episode does not have yet.
/// Remote chapter indexes are fetched only when `fetch_remote` is set.
pub async fn import_feed(
    db: &mut Datastore,
    fetcher: &dyn ChapterFetcher,
    config: &Config,
    source: &str,
    fetch_remote: bool,
) -> Result<ImportSummary> {
    let headers = RequestHeaders::new(config.fetch.user_agents.clone());
    let xml = read_feed(fetcher, &headers, source).await?;

    let root = XmlElement::parse(&xml).with_context(|| format!("Failed to parse feed {}", source))?;
    if feed::channel(&root).is_none() {
        bail!("Feed {} has no <channel>", source);
    }
    let feed_title = feed::feed_title(&root).unwrap_or(source).to_string();

    let archive_path = archived_feed_path(&config.storage.feeds_dir(), &feed_title);
    if let Some(parent) = archive_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&archive_path, &xml)
        .await
        .with_context(|| format!("Failed to archive feed to {}", archive_path.display()))?;
    info!("💾 Archived '{}' to {}", feed_title, archive_path.display());

    db.upsert_feed(source, &feed_title)?;

    let cache = RemoteChapterCache::new(config.storage.chapters_dir());
    let mut summary = ImportSummary {
        feed_title,
        xml_url: source.to_string(),
        archive_path,
        episodes: 0,
        skipped: 0,
        chapters: BTreeMap::new(),
    };
    let mut to_insert = Vec::new();

    for item in feed::items(&root) {
        let Some(episode) = FeedItem::from_element(item) else {
            warn!(
                "Skipping episode without enclosure URL: {}",
                item.child_text("title").unwrap_or("untitled")
            );
            summary.skipped += 1;
            continue;
        };

        db.upsert_episode(source, &episode)?;
        summary.episodes += 1;

        let mut options = ExtractOptions {
            skip: db.sources_for_episode(&episode.enclosure_url)?,
            ..Default::default()
        };
        if fetch_remote {
            options = options.with_remote(Some(cache.clone()));
        }

        let found = extract_chapters(item, fetcher, &headers.build(), &options).await;
        for (chapter_source, chapters) in found {
            *summary.chapters.entry(chapter_source).or_default() += chapters.len();
            to_insert.extend(ChapterRecord::for_episode(
                &episode.enclosure_url,
                episode.guid.as_deref(),
                chapter_source,
                chapters,
            ));
        }
    }

    db.insert_chapters(&to_insert)?;
    info!(
        "✅ Imported {} episodes from '{}' ({} chapters)",
        summary.episodes,
        summary.feed_title,
        to_insert.len()
    );

    Ok(summary)
}

async fn read_feed(
    fetcher: &dyn ChapterFetcher,
    headers: &RequestHeaders,
    source: &str,
) -> Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = fetcher.get(source, &headers.build()).await?;
        if !response.is_success() {
            bail!("⛔️ Error {} fetching podcast feed {}", response.status, source);
        }
        Ok(response.body)
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Cannot read feed file {}", source))
    }
}
