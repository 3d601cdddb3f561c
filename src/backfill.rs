use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::chapters::inline::extract_inline_chapters_for_guid;
use crate::chapters::{
    extract_description_chapters, fetch_remote_chapters, Chapter, ChapterRecord, ChapterSource,
    RemoteChapterCache,
};
use crate::config::Config;
use crate::datastore::{Datastore, RemoteCandidate};
use crate::feed::{sanitize_for_path, XmlElement};
use crate::http::{ChapterFetcher, RequestHeaders};

/// Outcome of one source pass
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub source: ChapterSource,
    /// Episodes examined
    pub candidates: usize,
    /// Episodes that yielded chapters
    pub found: usize,
    /// Chapter rows written
    pub inserted: usize,
    pub elapsed: Duration,
}

impl PassSummary {
    fn new(source: ChapterSource) -> Self {
        Self {
            source,
            candidates: 0,
            found: 0,
            inserted: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn log(&self) {
        info!(
            "📚 {} chapters: {} chapters found across {} candidates ({} episodes) in {:.2}s",
            self.source,
            self.inserted,
            self.candidates,
            self.found,
            self.elapsed.as_secs_f64()
        );
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} {:>6} candidates {:>6} episodes {:>8} chapters",
            self.source.tag(),
            self.candidates,
            self.found,
            self.inserted
        )
    }
}

/// Incremental chapter extraction across the whole store.
///
/// Each pass only sees episodes without chapters from its source, so
/// re-running after a partial or failed run picks up where it left off.
pub struct Backfill {
    db: Datastore,
    fetcher: Arc<dyn ChapterFetcher>,
    headers: RequestHeaders,
    cache: RemoteChapterCache,
    feeds_dir: PathBuf,
    batch_size: usize,
    worker_semaphore: Arc<Semaphore>,
}

impl Backfill {
    pub fn new(db: Datastore, fetcher: Arc<dyn ChapterFetcher>, config: &Config) -> Self {
        let batch_size = config.fetch.batch_size.max(1);
        debug!("🔧 Backfill with remote batches of {}", batch_size);

        Self {
            db,
            fetcher,
            headers: RequestHeaders::new(config.fetch.user_agents.clone()),
            cache: RemoteChapterCache::new(config.storage.chapters_dir()),
            feeds_dir: config.storage.feeds_dir(),
            batch_size,
            worker_semaphore: Arc::new(Semaphore::new(batch_size)),
        }
    }

    pub fn datastore(&self) -> &Datastore {
        &self.db
    }

    pub fn into_datastore(self) -> Datastore {
        self.db
    }

    /// Run the passes for `sources` in description, remote, inline order
    pub async fn run(&mut self, sources: &[ChapterSource]) -> Result<Vec<PassSummary>> {
        let mut summaries = Vec::new();

        for source in ChapterSource::EXTRACTED {
            if !sources.contains(&source) {
                continue;
            }
            let summary = match source {
                ChapterSource::Description => self.backfill_description()?,
                ChapterSource::Pci => self.backfill_remote().await?,
                ChapterSource::Psc => self.backfill_inline()?,
                _ => continue,
            };
            summaries.push(summary);
        }

        Ok(summaries)
    }

    /// Description pass: pure text, runs inline
    pub fn backfill_description(&mut self) -> Result<PassSummary> {
        let start_time = Instant::now();
        let mut summary = PassSummary::new(ChapterSource::Description);
        let mut to_insert = Vec::new();

        for candidate in self.db.description_candidates()? {
            summary.candidates += 1;
            if let Some(chapters) = extract_description_chapters(&candidate.description) {
                summary.found += 1;
                to_insert.extend(ChapterRecord::for_episode(
                    &candidate.enclosure_url,
                    candidate.guid.as_deref(),
                    ChapterSource::Description,
                    chapters,
                ));
            }
        }

        summary.inserted = self.db.insert_chapters(&to_insert)?;
        summary.elapsed = start_time.elapsed();
        summary.log();
        Ok(summary)
    }

    /// Remote pass: network bound, fetched in bounded batches. Each batch is
    /// stored before the next one starts.
    pub async fn backfill_remote(&mut self) -> Result<PassSummary> {
        let start_time = Instant::now();
        let mut summary = PassSummary::new(ChapterSource::Pci);

        let candidates = self.db.remote_candidates()?;
        if candidates.is_empty() {
            summary.log();
            return Ok(summary);
        }

        self.cache.initialize().await?;
        let mut cache_index = self.cache.index().await?;
        let total_batches = candidates.len().div_ceil(self.batch_size);

        for (batch_number, batch) in candidates.chunks(self.batch_size).enumerate() {
            debug!(
                "🌐 Fetching chapter batch {}/{} ({} episodes)",
                batch_number + 1,
                total_batches,
                batch.len()
            );

            let results = self.fetch_batch(batch, &mut cache_index).await;

            let mut to_insert = Vec::new();
            for (candidate, chapters) in results {
                summary.candidates += 1;
                if let Some(chapters) = chapters {
                    summary.found += 1;
                    to_insert.extend(ChapterRecord::for_episode(
                        &candidate.enclosure_url,
                        candidate.guid.as_deref(),
                        ChapterSource::Pci,
                        chapters,
                    ));
                }
            }
            summary.inserted += self.db.insert_chapters(&to_insert)?;
        }

        summary.elapsed = start_time.elapsed();
        summary.log();
        Ok(summary)
    }

    /// Fetch one batch concurrently; results come back in candidate order
    async fn fetch_batch(
        &self,
        batch: &[RemoteCandidate],
        cache_index: &mut HashMap<String, PathBuf>,
    ) -> Vec<(RemoteCandidate, Option<Vec<Chapter>>)> {
        let (tx, mut rx) = mpsc::channel(batch.len());

        for (index, candidate) in batch.iter().cloned().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&self.worker_semaphore);
            let headers = self.headers.build();
            let label = candidate
                .title
                .clone()
                .or_else(|| candidate.guid.clone())
                .unwrap_or_default();
            let cache_path = self
                .cache
                .resolve(cache_index, &candidate.chapters_url, &label);
            // Later candidates with the same URL share this file
            cache_index.insert(
                RemoteChapterCache::url_key(&candidate.chapters_url),
                cache_path.clone(),
            );
            let tx = tx.clone();

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                let chapters = fetch_remote_chapters(
                    fetcher.as_ref(),
                    &candidate.chapters_url,
                    &headers,
                    Some(&cache_path),
                )
                .await;

                if let Err(e) = tx.send((index, candidate, chapters)).await {
                    error!("Failed to send result: {}", e);
                }
            });
        }

        // Drop the original sender to close the channel when all tasks complete
        drop(tx);

        let mut results = Vec::with_capacity(batch.len());
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        if results.len() < batch.len() {
            warn!("⚠️ {} chapter fetches did not report back", batch.len() - results.len());
        }

        results.sort_by_key(|(index, _, _)| *index);
        results
            .into_iter()
            .map(|(_, candidate, chapters)| (candidate, chapters))
            .collect()
    }

    /// Inline pass: reads the archived feed of each candidate, parsing each
    /// feed file at most once
    pub fn backfill_inline(&mut self) -> Result<PassSummary> {
        let start_time = Instant::now();
        let mut summary = PassSummary::new(ChapterSource::Psc);
        let mut feeds: HashMap<String, Option<XmlElement>> = HashMap::new();
        let mut to_insert = Vec::new();

        for candidate in self.db.inline_candidates()? {
            summary.candidates += 1;

            let root = feeds
                .entry(candidate.feed_title.clone())
                .or_insert_with(|| load_archived_feed(&self.feeds_dir, &candidate.feed_title));
            let Some(root) = root.as_ref() else {
                continue;
            };

            if let Some(chapters) = extract_inline_chapters_for_guid(root, &candidate.guid) {
                summary.found += 1;
                to_insert.extend(ChapterRecord::for_episode(
                    &candidate.enclosure_url,
                    Some(&candidate.guid),
                    ChapterSource::Psc,
                    chapters,
                ));
            }
        }

        summary.inserted = self.db.insert_chapters(&to_insert)?;
        summary.elapsed = start_time.elapsed();
        summary.log();
        Ok(summary)
    }
}

/// Archive location of a feed document
pub fn archived_feed_path(feeds_dir: &Path, feed_title: &str) -> PathBuf {
    feeds_dir.join(format!("{}.xml", sanitize_for_path(feed_title)))
}

fn load_archived_feed(feeds_dir: &Path, feed_title: &str) -> Option<XmlElement> {
    let path = archived_feed_path(feeds_dir, feed_title);
    if !path.exists() {
        warn!("⚠️ No archived feed for '{}' at {}", feed_title, path.display());
        return None;
    }

    match XmlElement::parse_file(&path) {
        Ok(root) => Some(root),
        Err(e) => {
            warn!("⚠️ Cannot parse archived feed {}: {}", path.display(), e);
            None
        }
    }
}
