//! File cache for remote chapter indexes

use super::remote::parse_chapter_index;
use crate::error::Result;
use crate::feed::sanitize_for_path;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Longest label prefix kept in a cache file name
const MAX_LABEL_CHARS: usize = 40;

/// Raw chapter index bodies keyed by the index URL.
///
/// Files are named `<label>_<url hash>.json`; the label only makes the
/// directory readable. Entries never expire, removing a file is the only
/// way to force a refetch.
#[derive(Debug, Clone)]
pub struct RemoteChapterCache {
    cache_dir: PathBuf,
}

impl RemoteChapterCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Initialize cache directory
    pub async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        debug!("📁 Chapter cache directory ready: {}", self.cache_dir.display());
        Ok(())
    }

    /// Hash suffix identifying `url`
    pub fn url_key(url: &str) -> String {
        let digest = format!("{:x}", md5::compute(url.as_bytes()));
        digest[..8].to_string()
    }

    /// File name for `url`, labelled with an episode title or similar
    pub fn file_name(url: &str, label: &str) -> String {
        let label: String = sanitize_for_path(label)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .chars()
            .take(MAX_LABEL_CHARS)
            .collect();
        let label = if label.is_empty() { "chapters".to_string() } else { label };
        format!("{}_{}.json", label, Self::url_key(url))
    }

    /// Cache path for `url`. An existing file for the same URL is reused
    /// even if it was written under a different label.
    pub async fn path_for(&self, url: &str, label: &str) -> PathBuf {
        match self.find(url).await {
            Ok(Some(existing)) => existing,
            _ => self.cache_dir.join(Self::file_name(url, label)),
        }
    }

    /// Existing cache files by URL key, for resolving many URLs at once
    pub async fn index(&self) -> Result<HashMap<String, PathBuf>> {
        Ok(self
            .json_files()
            .await?
            .into_iter()
            .filter_map(|path| {
                let name = file_name_of(&path);
                let key = name.strip_suffix(".json")?.rsplit('_').next()?.to_string();
                Some((key, path))
            })
            .collect())
    }

    /// Like [`Self::path_for`], against a snapshot from [`Self::index`]
    pub fn resolve(&self, index: &HashMap<String, PathBuf>, url: &str, label: &str) -> PathBuf {
        index
            .get(&Self::url_key(url))
            .cloned()
            .unwrap_or_else(|| self.cache_dir.join(Self::file_name(url, label)))
    }

    /// Existing cache file for `url`
    pub async fn find(&self, url: &str) -> Result<Option<PathBuf>> {
        let suffix = format!("_{}.json", Self::url_key(url));
        Ok(self
            .json_files()
            .await?
            .into_iter()
            .find(|path| file_name_of(path).ends_with(&suffix)))
    }

    /// Remove the cached index for `url`
    pub async fn remove(&self, url: &str) -> Result<bool> {
        match self.find(url).await? {
            Some(path) => {
                tokio::fs::remove_file(&path).await?;
                info!("🗑️ Removed cached chapter index: {}", path.display());
                Ok(true)
            }
            None => {
                debug!("No cached chapter index for {}", url);
                Ok(false)
            }
        }
    }

    /// Remove every cached index
    pub async fn clear(&self) -> Result<usize> {
        let mut cleared_count = 0;
        for path in self.json_files().await? {
            if tokio::fs::remove_file(&path).await.is_ok() {
                cleared_count += 1;
                debug!("🗑️ Removed cache file: {}", path.display());
            }
        }

        if cleared_count > 0 {
            info!("🧹 Cleared {} cache files", cleared_count);
        }

        Ok(cleared_count)
    }

    /// Cached indexes, newest first
    pub async fn list(&self) -> Result<Vec<CachedIndexInfo>> {
        let mut entries = Vec::new();

        for path in self.json_files().await? {
            let metadata = tokio::fs::metadata(&path).await?;
            let modified = metadata.modified().ok().map(DateTime::<Local>::from);
            let chapter_count = tokio::fs::read_to_string(&path)
                .await
                .ok()
                .and_then(|body| parse_chapter_index(&path.display().to_string(), &body).ok())
                .map(|chapters| chapters.len());

            entries.push(CachedIndexInfo {
                file_name: file_name_of(&path),
                size_bytes: metadata.len(),
                chapter_count,
                modified,
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(entries)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();

        for entry in self.list().await? {
            stats.total_files += 1;
            stats.total_bytes += entry.size_bytes;
            match entry.chapter_count {
                Some(count) => {
                    stats.valid_files += 1;
                    stats.total_chapters += count;
                }
                None => stats.unreadable_files += 1,
            }
        }

        Ok(stats)
    }

    async fn json_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_files: usize,
    pub valid_files: usize,
    /// Files that are not a parseable chapter index
    pub unreadable_files: usize,
    pub total_chapters: usize,
    pub total_bytes: u64,
}

/// Information about a cached index
#[derive(Debug, Clone)]
pub struct CachedIndexInfo {
    pub file_name: String,
    pub size_bytes: u64,
    pub chapter_count: Option<usize>,
    pub modified: Option<DateTime<Local>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://cdn.test/show/ep1.json";
    const INDEX: &str = r#"{"chapters": [{"startTime": 0, "title": "A"}, {"startTime": 10, "title": "B"}]}"#;

    #[test]
    fn test_file_name_is_sanitized_and_keyed_by_url() {
        let name = RemoteChapterCache::file_name(URL, "Episode #12: Part 1/2");
        assert!(name.starts_with("Episode_12_Part_12_"));
        assert!(name.ends_with(&format!("_{}.json", RemoteChapterCache::url_key(URL))));

        let other = RemoteChapterCache::file_name("https://cdn.test/show/ep2.json", "Episode #12: Part 1/2");
        assert_ne!(name, other);
    }

    #[test]
    fn test_empty_label_falls_back() {
        let name = RemoteChapterCache::file_name(URL, "???");
        assert!(name.starts_with("chapters_"));
    }

    #[tokio::test]
    async fn test_path_for_reuses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = RemoteChapterCache::new(temp_dir.path());
        cache.initialize().await.unwrap();

        let first = cache.path_for(URL, "Old title").await;
        std::fs::write(&first, INDEX).unwrap();

        assert_eq!(cache.path_for(URL, "Renamed episode").await, first);
        assert_eq!(cache.find(URL).await.unwrap(), Some(first.clone()));

        let index = cache.index().await.unwrap();
        assert_eq!(cache.resolve(&index, URL, "Another title"), first);
        assert_eq!(
            cache.resolve(&index, "https://cdn.test/new.json", "New"),
            temp_dir.path().join(RemoteChapterCache::file_name("https://cdn.test/new.json", "New"))
        );
    }

    #[tokio::test]
    async fn test_list_stats_remove_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = RemoteChapterCache::new(temp_dir.path());
        cache.initialize().await.unwrap();

        std::fs::write(cache.path_for(URL, "One").await, INDEX).unwrap();
        let other = "https://cdn.test/show/ep2.json";
        std::fs::write(cache.path_for(other, "Two").await, "<html>").unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.valid_files, 1);
        assert_eq!(stats.unreadable_files, 1);
        assert_eq!(stats.total_chapters, 2);

        assert!(cache.remove(URL).await.unwrap());
        assert!(!cache.remove(URL).await.unwrap());
        assert_eq!(cache.list().await.unwrap().len(), 1);

        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(cache.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = RemoteChapterCache::new(temp_dir.path().join("absent"));

        assert!(cache.list().await.unwrap().is_empty());
        assert_eq!(cache.clear().await.unwrap(), 0);
        assert_eq!(cache.find(URL).await.unwrap(), None);
    }
}
